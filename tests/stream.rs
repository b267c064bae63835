//! Tests for the stream operator set: eager operators, terminals, and
//! lazy streams with pushdown and terminal lowering.

mod common;

use common::*;
use std::sync::Arc;
use tessera::kv::region::KeyRange;
use tessera::stream::eager::{union, ArrayStream, StreamExt};
use tessera::stream::func::FuncExpr;
use tessera::stream::lazy::LazyStream;
use tessera::stream::Stream;
use tessera::{Datum, Interruptor};

fn nums(values: &[f64]) -> Vec<Datum> {
    values.iter().map(|v| num(*v)).collect()
}

fn stream_of(values: &[f64]) -> ArrayStream {
    ArrayStream::from_vec(nums(values))
}

// ============================================================================
// Eager Operators
// ============================================================================

#[test]
fn map_transforms_elements() {
    let mut mapped = stream_of(&[1.0, 2.0, 3.0]).map(FuncExpr::add(
        FuncExpr::row(),
        FuncExpr::constant(10.0),
    ));
    assert_eq!(mapped.drain().unwrap(), nums(&[11.0, 12.0, 13.0]));
}

#[test]
fn filter_keeps_truthy_elements() {
    let mut filtered = stream_of(&[1.0, 2.0, 3.0, 4.0]).filter(FuncExpr::lt(
        FuncExpr::constant(2.0),
        FuncExpr::row(),
    ));
    assert_eq!(filtered.drain().unwrap(), nums(&[3.0, 4.0]));
}

#[test]
fn concat_map_flattens_in_order() {
    let rows = vec![
        Datum::Arr(vec![num(1.0), num(2.0)]),
        Datum::Arr(vec![]),
        Datum::Arr(vec![num(3.0)]),
    ];
    let mut flattened = ArrayStream::from_vec(rows).concat_map(FuncExpr::row());
    assert_eq!(flattened.drain().unwrap(), nums(&[1.0, 2.0, 3.0]));
}

#[test]
fn concat_map_requires_array_results() {
    let mut expanded = stream_of(&[1.0]).concat_map(FuncExpr::row());
    assert_user_query(expanded.next(), "Expected ARRAY but got NUMBER.");
}

#[test]
fn slice_delivers_half_open_window() {
    let mut sliced = stream_of(&[1.0, 2.0, 3.0, 4.0, 5.0]).slice(1, 3);
    assert_eq!(sliced.drain().unwrap(), nums(&[2.0, 3.0]));
}

#[test]
fn slice_out_of_range_is_empty() {
    let mut sliced = stream_of(&[1.0, 2.0, 3.0, 4.0, 5.0]).slice(10, 20);
    assert_eq!(sliced.drain().unwrap(), Vec::<Datum>::new());
}

#[test]
fn slice_inverted_bounds_is_empty() {
    let mut sliced = stream_of(&[1.0, 2.0, 3.0, 4.0, 5.0]).slice(3, 1);
    assert_eq!(sliced.drain().unwrap(), Vec::<Datum>::new());
}

#[test]
fn union_concatenates_in_argument_order() {
    let mut unioned = union(vec![
        stream_of(&[1.0, 2.0]).boxed(),
        stream_of(&[3.0]).boxed(),
        stream_of(&[]).boxed(),
        stream_of(&[4.0, 5.0]).boxed(),
    ]);
    assert_eq!(unioned.drain().unwrap(), nums(&[1.0, 2.0, 3.0, 4.0, 5.0]));
}

#[test]
fn zip_merges_right_over_left() {
    let rows = vec![Datum::obj([
        (
            "left",
            Datum::obj([("id", num(1.0)), ("name", s("old"))]),
        ),
        ("right", Datum::obj([("name", s("new"))])),
    ])];
    let mut zipped = ArrayStream::from_vec(rows).zip();
    assert_eq!(
        zipped.drain().unwrap(),
        vec![Datum::obj([("id", num(1.0)), ("name", s("new"))])]
    );
}

#[test]
fn zip_without_right_passes_left_through() {
    let rows = vec![Datum::obj([("left", Datum::obj([("id", num(1.0))]))])];
    let mut zipped = ArrayStream::from_vec(rows).zip();
    assert_eq!(
        zipped.drain().unwrap(),
        vec![Datum::obj([("id", num(1.0))])]
    );
}

#[test]
fn zip_requires_join_rows() {
    let rows = vec![Datum::obj([("right", Datum::obj([("x", num(1.0))]))])];
    let mut zipped = ArrayStream::from_vec(rows).zip();
    assert_user_query(
        zipped.next(),
        "ZIP can only be called on the result of a join.",
    );
}

// ============================================================================
// Terminals
// ============================================================================

#[test]
fn count_counts() {
    assert_eq!(stream_of(&[1.0, 2.0, 3.0]).count().unwrap(), num(3.0));
    assert_eq!(stream_of(&[]).count().unwrap(), num(0.0));
}

#[test]
fn reduce_folds_left() {
    let total = stream_of(&[1.0, 2.0, 3.0])
        .reduce(None, &FuncExpr::fold_add())
        .unwrap();
    assert_eq!(total, num(6.0));
}

#[test]
fn reduce_folds_base_in() {
    let total = stream_of(&[1.0, 2.0, 3.0])
        .reduce(Some(&num(10.0)), &FuncExpr::fold_add())
        .unwrap();
    assert_eq!(total, num(16.0));
}

#[test]
fn empty_reduce_without_base_is_a_query_error() {
    let result = stream_of(&[]).reduce(None, &FuncExpr::fold_add());
    assert_user_query(result, "Cannot reduce over an empty stream with no base.");
}

#[test]
fn empty_reduce_with_base_returns_base() {
    let result = stream_of(&[]).reduce(Some(&num(7.0)), &FuncExpr::fold_add());
    assert_eq!(result.unwrap(), num(7.0));
}

#[test]
fn group_map_reduce_groups_and_reduces() {
    let rows = vec![
        doc("a", 1.0),
        doc("b", 10.0),
        doc("a", 2.0),
        doc("b", 20.0),
    ];
    let grouped = ArrayStream::from_vec(rows)
        .group_map_reduce(
            &FuncExpr::field("kind"),
            &FuncExpr::field("value"),
            None,
            &FuncExpr::fold_add(),
        )
        .unwrap();
    assert_eq!(
        grouped,
        Datum::Arr(vec![
            Datum::obj([("group", s("a")), ("reduction", num(3.0))]),
            Datum::obj([("group", s("b")), ("reduction", num(30.0))]),
        ])
    );
}

#[test]
fn group_map_reduce_folds_base_into_each_group() {
    let rows = vec![doc("a", 1.0), doc("b", 10.0)];
    let grouped = ArrayStream::from_vec(rows)
        .group_map_reduce(
            &FuncExpr::field("kind"),
            &FuncExpr::field("value"),
            Some(&num(100.0)),
            &FuncExpr::fold_add(),
        )
        .unwrap();
    assert_eq!(
        grouped,
        Datum::Arr(vec![
            Datum::obj([("group", s("a")), ("reduction", num(101.0))]),
            Datum::obj([("group", s("b")), ("reduction", num(110.0))]),
        ])
    );
}

// ============================================================================
// Lazy Streams
// ============================================================================

fn seeded_namespace() -> Arc<tessera::Namespace<tessera::KvProtocol>> {
    let ns = split_namespace(&[b"key-05"]);
    let rows: Vec<(Vec<u8>, Datum)> = (0..10)
        .map(|i| {
            (
                format!("key-{:02}", i).into_bytes(),
                doc(if i % 2 == 0 { "even" } else { "odd" }, i as f64),
            )
        })
        .collect();
    let borrowed: Vec<(&[u8], Datum)> = rows
        .iter()
        .map(|(k, v)| (k.as_slice(), v.clone()))
        .collect();
    seed(&ns, &borrowed);
    ns
}

#[test]
fn lazy_stream_scans_in_key_order() {
    let ns = seeded_namespace();
    let mut stream = LazyStream::new(ns, KeyRange::universe(), Interruptor::new());
    let values: Vec<Datum> = stream.drain().unwrap();
    assert_eq!(values.len(), 10);
    assert_eq!(values[0], doc("even", 0.0));
    assert_eq!(values[9], doc("odd", 9.0));
}

#[test]
fn lazy_transforms_push_down_without_fetching() {
    let ns = seeded_namespace();
    let stream = LazyStream::new(ns, KeyRange::universe(), Interruptor::new())
        .filter(FuncExpr::eq(
            FuncExpr::field("kind"),
            FuncExpr::constant("even"),
        ))
        .map(FuncExpr::field("value"));
    assert_eq!(stream.transforms().len(), 2);

    let mut stream = stream;
    assert_eq!(
        stream.drain().unwrap(),
        nums(&[0.0, 2.0, 4.0, 6.0, 8.0])
    );
}

#[test]
fn lazy_agrees_with_eager() {
    let ns = seeded_namespace();

    // The same pipeline evaluated remotely and locally.
    let mut lazy = LazyStream::new(Arc::clone(&ns), KeyRange::universe(), Interruptor::new())
        .map(FuncExpr::field("value"));
    let remote = lazy.drain().unwrap();

    let base_rows = LazyStream::new(ns, KeyRange::universe(), Interruptor::new())
        .drain()
        .unwrap();
    let local = ArrayStream::from_vec(base_rows)
        .map(FuncExpr::field("value"))
        .drain()
        .unwrap();
    assert_eq!(remote, local);
}

#[test]
fn lazy_batches_are_bounded() {
    let ns = seeded_namespace();
    let mut stream =
        LazyStream::new(ns, KeyRange::universe(), Interruptor::new()).with_batch_size(3);
    let first = stream.next_batch().unwrap();
    assert_eq!(first.len(), 3);
    let rest = stream.drain().unwrap();
    assert_eq!(rest.len(), 7);
}

#[test]
fn lazy_count_lowers_across_shards() {
    let ns = seeded_namespace();
    let mut stream = LazyStream::new(ns, KeyRange::universe(), Interruptor::new());
    assert_eq!(stream.count().unwrap(), num(10.0));
}

#[test]
fn lazy_reduce_lowers_and_applies_base() {
    let ns = seeded_namespace();
    let sum_of_values = LazyStream::new(Arc::clone(&ns), KeyRange::universe(), Interruptor::new())
        .map(FuncExpr::field("value"))
        .reduce(None, &FuncExpr::fold_add())
        .unwrap();
    assert_eq!(sum_of_values, num(45.0));

    let with_base = LazyStream::new(ns, KeyRange::universe(), Interruptor::new())
        .map(FuncExpr::field("value"))
        .reduce(Some(&num(5.0)), &FuncExpr::fold_add())
        .unwrap();
    assert_eq!(with_base, num(50.0));
}

#[test]
fn lazy_empty_reduce_matches_eager_error() {
    let ns = seeded_namespace();
    let result = LazyStream::new(
        ns,
        KeyRange::new(b"zzz".to_vec(), None),
        Interruptor::new(),
    )
    .reduce(None, &FuncExpr::fold_add());
    assert_user_query(result, "Cannot reduce over an empty stream with no base.");
}

#[test]
fn lazy_group_map_reduce_lowers() {
    let ns = seeded_namespace();
    let grouped = LazyStream::new(ns, KeyRange::universe(), Interruptor::new())
        .group_map_reduce(
            &FuncExpr::field("kind"),
            &FuncExpr::field("value"),
            None,
            &FuncExpr::fold_add(),
        )
        .unwrap();
    assert_eq!(
        grouped,
        Datum::Arr(vec![
            Datum::obj([("group", s("even")), ("reduction", num(20.0))]),
            Datum::obj([("group", s("odd")), ("reduction", num(25.0))]),
        ])
    );
}

#[test]
fn lazy_stream_wraps_with_client_side_operators() {
    let ns = seeded_namespace();
    let mut sliced = LazyStream::new(ns, KeyRange::universe(), Interruptor::new())
        .map(FuncExpr::field("value"))
        .slice(2, 5);
    assert_eq!(sliced.drain().unwrap(), nums(&[2.0, 3.0, 4.0]));
}

#[test]
fn lazy_next_honours_the_interruptor() {
    let ns = seeded_namespace();
    let interruptor = Interruptor::new();
    let mut stream = LazyStream::new(ns, KeyRange::universe(), interruptor.clone());
    interruptor.pulse();
    assert_interrupted(stream.next());
}
