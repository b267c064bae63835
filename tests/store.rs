//! Tests for the in-memory reference store: reads, deterministic writes,
//! preconditions, interruption, and persistence.

mod common;

use common::*;
use tessera::core::order::{OrderSource, OrderToken};
use tessera::core::timestamp::{StateTimestamp, TransitionTimestamp};
use tessera::kv::query::{KvRead, KvReadResponse, KvWrite, KvWriteResponse, RangeRead, WriteOutcome};
use tessera::kv::region::KeyRange;
use tessera::kv::store::MemoryStore;
use tessera::protocol::store::{StoreOps, StoreStatus};
use tessera::stream::func::FuncExpr;
use tessera::stream::transform::Transform;
use tessera::{Datum, Interruptor};

fn range(start: &[u8], end: &[u8]) -> KeyRange {
    KeyRange::new(start.to_vec(), Some(end.to_vec()))
}

// ============================================================================
// Reads and Writes
// ============================================================================

#[test]
fn point_read_after_write() {
    let store = universe_store();
    set(&store, b"k", num(42.0));

    let response = read_one(
        &store,
        KvRead::Point { key: b"k".to_vec() },
    )
    .unwrap();
    assert_eq!(response, KvReadResponse::Value(Some(num(42.0))));

    let missing = read_one(
        &store,
        KvRead::Point {
            key: b"absent".to_vec(),
        },
    )
    .unwrap();
    assert_eq!(missing, KvReadResponse::Value(None));
}

#[test]
fn write_outcomes() {
    let store = universe_store();
    let created = write_one(
        &store,
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(1.0),
        },
    )
    .unwrap();
    assert_eq!(created, KvWriteResponse::Single(WriteOutcome::Created));

    let replaced = write_one(
        &store,
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(2.0),
        },
    )
    .unwrap();
    assert_eq!(replaced, KvWriteResponse::Single(WriteOutcome::Replaced));

    let deleted = write_one(&store, KvWrite::Delete { key: b"k".to_vec() }).unwrap();
    assert_eq!(deleted, KvWriteResponse::Single(WriteOutcome::Deleted));

    let missing = write_one(&store, KvWrite::Delete { key: b"k".to_vec() }).unwrap();
    assert_eq!(missing, KvWriteResponse::Single(WriteOutcome::Missing));
}

#[test]
fn append_semantics() {
    let store = universe_store();
    set(&store, b"text", s("x"));
    let appended = write_one(
        &store,
        KvWrite::Append {
            key: b"text".to_vec(),
            suffix: s("a"),
        },
    )
    .unwrap();
    assert_eq!(appended, KvWriteResponse::Single(WriteOutcome::Appended));
    assert_eq!(store.get(b"text"), Some(s("xa")));

    set(&store, b"list", Datum::Arr(vec![num(1.0)]));
    write_one(
        &store,
        KvWrite::Append {
            key: b"list".to_vec(),
            suffix: Datum::Arr(vec![num(2.0)]),
        },
    )
    .unwrap();
    assert_eq!(store.get(b"list"), Some(Datum::Arr(vec![num(1.0), num(2.0)])));

    // A missing key is created from the suffix.
    let created = write_one(
        &store,
        KvWrite::Append {
            key: b"fresh".to_vec(),
            suffix: s("seed"),
        },
    )
    .unwrap();
    assert_eq!(created, KvWriteResponse::Single(WriteOutcome::Created));
}

#[test]
fn append_type_mismatch_does_not_commit() {
    let store = universe_store();
    set(&store, b"text", s("x"));
    let before = store.timestamp();

    let result = write_one(
        &store,
        KvWrite::Append {
            key: b"text".to_vec(),
            suffix: num(5.0),
        },
    );
    assert_user_query(result, "Cannot append NUMBER to STRING.");
    assert_eq!(store.timestamp(), before);
    assert_eq!(store.get(b"text"), Some(s("x")));
}

#[test]
fn batch_commits_atomically_per_store() {
    let store = universe_store();
    set(&store, b"text", s("x"));
    let before = store.fingerprint();

    // The second member fails; the first must not land either.
    let result = write_one(
        &store,
        KvWrite::Batch {
            ops: vec![
                KvWrite::Set {
                    key: b"new".to_vec(),
                    value: num(1.0),
                },
                KvWrite::Append {
                    key: b"text".to_vec(),
                    suffix: num(5.0),
                },
            ],
        },
    );
    assert!(result.is_err());
    assert_eq!(store.fingerprint(), before);
    assert_eq!(store.get(b"new"), None);
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn write_requires_matching_transition() {
    let store = universe_store();
    set(&store, b"k", num(1.0));

    let stale = TransitionTimestamp::starting_at(StateTimestamp::zero());
    let result = store.write(
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(2.0),
        },
        stale,
        OrderToken::unordered(),
        &Interruptor::new(),
    );
    assert_invariant(result);
    assert_eq!(store.timestamp().count(), 1);
    assert_eq!(store.get(b"k"), Some(num(1.0)));
}

#[test]
fn read_outside_region_rejected() {
    let store = MemoryStore::create(range(b"a", b"m"));
    let result = read_one(
        &store,
        KvRead::Range(RangeRead::scan(range(b"a", b"z"))),
    );
    assert_invariant(result);
}

#[test]
fn operations_require_serving() {
    let store = universe_store();
    store.backfillee_begin().unwrap();

    assert_invariant(read_one(&store, KvRead::Point { key: b"k".to_vec() }));
    assert_invariant(write_one(
        &store,
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(1.0),
        },
    ));
}

#[test]
fn order_regression_rejected_by_store() {
    let store = universe_store();
    let origin = OrderSource::new(3).unwrap();
    let first = origin.token();
    let second = origin.token();

    store
        .write(
            KvWrite::Set {
                key: b"k".to_vec(),
                value: num(1.0),
            },
            TransitionTimestamp::starting_at(store.timestamp()),
            second,
            &Interruptor::new(),
        )
        .unwrap();

    // Replaying the earlier token is a dispatch-layer bug.
    let result = store.write(
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(2.0),
        },
        TransitionTimestamp::starting_at(store.timestamp()),
        first,
        &Interruptor::new(),
    );
    assert_invariant(result);
    assert_eq!(store.get(b"k"), Some(num(1.0)));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn identical_write_sequences_produce_identical_states() {
    let a = universe_store();
    let b = universe_store();
    let writes = [
        KvWrite::Set {
            key: b"x".to_vec(),
            value: s("x"),
        },
        KvWrite::Append {
            key: b"x".to_vec(),
            suffix: s("a"),
        },
        KvWrite::Set {
            key: b"y".to_vec(),
            value: Datum::obj([("n", num(1.0))]),
        },
        KvWrite::Delete { key: b"y".to_vec() },
    ];
    for write in &writes {
        write_one(&a, write.clone()).unwrap();
        write_one(&b, write.clone()).unwrap();
    }
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.timestamp(), b.timestamp());
}

#[test]
fn divergent_sequences_produce_different_states() {
    let a = universe_store();
    let b = universe_store();
    set(&a, b"k", s("one"));
    set(&b, b"k", s("two"));
    assert_ne!(a.fingerprint(), b.fingerprint());
}

// ============================================================================
// Range Reads with Pushdown
// ============================================================================

fn seeded_store() -> MemoryStore {
    let store = universe_store();
    for (key, kind, value) in [
        (b"d-1".as_slice(), "a", 1.0),
        (b"d-2", "b", 2.0),
        (b"d-3", "a", 3.0),
        (b"d-4", "b", 4.0),
    ] {
        set(&store, key, doc(kind, value));
    }
    store
}

#[test]
fn range_read_applies_transform_stack() {
    let store = seeded_store();
    let read = KvRead::Range(RangeRead {
        range: KeyRange::universe(),
        transforms: vec![
            Transform::Filter(FuncExpr::eq(
                FuncExpr::field("kind"),
                FuncExpr::constant("a"),
            )),
            Transform::Map(FuncExpr::field("value")),
        ],
        terminal: None,
        limit: None,
    });
    match read_one(&store, read).unwrap() {
        KvReadResponse::Batch(rows) => {
            let values: Vec<Datum> = rows.into_iter().map(|r| r.datum).collect();
            assert_eq!(values, vec![num(1.0), num(3.0)]);
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn range_read_limit_respects_key_boundaries() {
    let store = universe_store();
    set(&store, b"k-1", Datum::Arr(vec![num(1.0), num(2.0), num(3.0)]));
    set(&store, b"k-2", Datum::Arr(vec![num(4.0)]));

    // Each source key expands to several elements; the limit may only be
    // exceeded to finish the key it landed on.
    let read = KvRead::Range(RangeRead {
        range: KeyRange::universe(),
        transforms: vec![Transform::ConcatMap(FuncExpr::row())],
        terminal: None,
        limit: Some(2),
    });
    match read_one(&store, read).unwrap() {
        KvReadResponse::Batch(rows) => {
            assert_eq!(rows.len(), 3);
            assert!(rows.iter().all(|r| r.key == b"k-1"));
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn range_read_transform_error_surfaces() {
    let store = universe_store();
    set(&store, b"k", num(1.0));
    let read = KvRead::Range(RangeRead {
        range: KeyRange::universe(),
        transforms: vec![Transform::Map(FuncExpr::field("missing"))],
        terminal: None,
        limit: None,
    });
    let result = read_one(&store, read);
    assert_user_query(result, "Cannot get attribute `missing` of NUMBER.");
}

// ============================================================================
// Interruption
// ============================================================================

#[test]
fn interrupted_write_does_not_commit() {
    let store = universe_store();
    let interruptor = Interruptor::new();
    interruptor.pulse();

    let result = store.write(
        KvWrite::Set {
            key: b"k".to_vec(),
            value: num(1.0),
        },
        TransitionTimestamp::starting_at(store.timestamp()),
        OrderToken::unordered(),
        &interruptor,
    );
    assert_interrupted(result);
    assert_eq!(store.timestamp(), StateTimestamp::zero());
    assert_eq!(store.get(b"k"), None);
}

#[test]
fn interrupted_read_fails_promptly() {
    let store = seeded_store();
    let interruptor = Interruptor::new();
    interruptor.pulse();
    let result = store.read(
        KvRead::Range(RangeRead::scan(KeyRange::universe())),
        OrderToken::unordered(),
        &interruptor,
    );
    assert_interrupted(result);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn reopened_store_restores_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.tsr");

    let fingerprint = {
        let store = MemoryStore::create_at(range(b"a", b"m"), &path).unwrap();
        set(&store, b"apple", doc("fruit", 1.0));
        set(&store, b"berry", doc("fruit", 2.0));
        write_one(&store, KvWrite::Delete { key: b"apple".to_vec() }).unwrap();
        store.fingerprint()
    };

    let reopened = MemoryStore::open(&path).unwrap();
    assert_eq!(reopened.fingerprint(), fingerprint);
    assert_eq!(reopened.region(), range(b"a", b"m"));
    assert_eq!(reopened.timestamp().count(), 3);
    assert!(reopened.status().is_serving());
    assert_eq!(reopened.get(b"berry"), Some(doc("fruit", 2.0)));
    assert_eq!(reopened.get(b"apple"), None);
}

#[test]
fn store_closed_mid_backfill_reopens_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.tsr");

    {
        let store = MemoryStore::create_at(KeyRange::universe(), &path).unwrap();
        set(&store, b"k", num(1.0));
        store.backfillee_begin().unwrap();
        assert!(store.is_backfilling());
    }

    let reopened = MemoryStore::open(&path).unwrap();
    assert!(!reopened.is_coherent());
    assert!(!reopened.is_backfilling());
    assert_eq!(reopened.status(), StoreStatus::empty());
}

#[test]
fn destroy_removes_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.tsr");
    let store = MemoryStore::create_at(KeyRange::universe(), &path).unwrap();
    assert!(path.exists());
    store.destroy().unwrap();
    assert!(!path.exists());
}
