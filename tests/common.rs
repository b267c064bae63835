//! Common test utilities.
//!
//! Shared helpers for the integration suites. Import with `mod common;`
//! in test files.

#![allow(dead_code)]

use std::sync::Arc;
use tessera::core::order::OrderToken;
use tessera::core::timestamp::TransitionTimestamp;
use tessera::kv::query::{KvProtocol, KvRead, KvReadResponse, KvWrite, KvWriteResponse, RangeRead};
use tessera::kv::region::KeyRange;
use tessera::kv::store::MemoryStore;
use tessera::namespace::facade::Namespace;
use tessera::protocol::store::StoreOps;
use tessera::{CoreConfig, Datum, Interruptor, TesseraResult};

/// Install a test subscriber so `RUST_LOG` surfaces core tracing.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An ephemeral store over the whole keyspace.
pub fn universe_store() -> MemoryStore {
    MemoryStore::create(KeyRange::universe())
}

/// Apply a write to a store at its current timestamp.
pub fn write_one(store: &MemoryStore, write: KvWrite) -> TesseraResult<KvWriteResponse> {
    let timestamp = TransitionTimestamp::starting_at(store.timestamp());
    store.write(
        write,
        timestamp,
        OrderToken::unordered(),
        &Interruptor::new(),
    )
}

/// Set a key to a value at the store's current timestamp.
pub fn set(store: &MemoryStore, key: &[u8], value: Datum) {
    write_one(
        store,
        KvWrite::Set {
            key: key.to_vec(),
            value,
        },
    )
    .expect("set failed");
}

/// Execute a read against a store.
pub fn read_one(store: &MemoryStore, read: KvRead) -> TesseraResult<KvReadResponse> {
    store.read(read, OrderToken::unordered(), &Interruptor::new())
}

/// Read a whole range with no pushdown.
pub fn scan(store: &MemoryStore, range: KeyRange) -> Vec<(Vec<u8>, Datum)> {
    match read_one(store, KvRead::Range(RangeRead::scan(range))).expect("scan failed") {
        KvReadResponse::Batch(rows) => rows.into_iter().map(|r| (r.key, r.datum)).collect(),
        other => panic!("scan produced {:?}", other),
    }
}

/// A namespace over stores splitting the keyspace at `splits`.
///
/// For splits `[m]` the shards are `[..m)` and `[m..)`; for `[h, p]`
/// they are `[..h)`, `[h..p)`, `[p..)`; and so on.
pub fn split_namespace(splits: &[&[u8]]) -> Arc<Namespace<KvProtocol>> {
    let mut stores: Vec<Arc<dyn StoreOps<KvProtocol>>> = Vec::new();
    let mut start: Vec<u8> = Vec::new();
    for split in splits {
        stores.push(Arc::new(MemoryStore::create(KeyRange::new(
            start.clone(),
            Some(split.to_vec()),
        ))));
        start = split.to_vec();
    }
    stores.push(Arc::new(MemoryStore::create(KeyRange::new(start, None))));
    Arc::new(Namespace::new(stores, CoreConfig::default()).expect("partition is valid"))
}

/// Write a set of keyed documents through a namespace facade.
pub fn seed(ns: &Namespace<KvProtocol>, rows: &[(&[u8], Datum)]) {
    for (key, value) in rows {
        ns.write(
            KvWrite::Set {
                key: key.to_vec(),
                value: value.clone(),
            },
            OrderToken::unordered(),
            &Interruptor::new(),
        )
        .expect("seed write failed");
    }
}

/// Shorthand for a number datum.
pub fn num(n: f64) -> Datum {
    Datum::Num(n)
}

/// Shorthand for a string datum.
pub fn s(text: &str) -> Datum {
    Datum::Str(text.to_string())
}

/// A document with a string `kind` and numeric `value` field.
pub fn doc(kind: &str, value: f64) -> Datum {
    Datum::obj([("kind", s(kind)), ("value", num(value))])
}

/// Assert that a result failed with a query error carrying `message`.
#[track_caller]
pub fn assert_user_query<T: std::fmt::Debug>(result: TesseraResult<T>, message: &str) {
    match result {
        Err(tessera::TesseraError::UserQuery { message: actual }) => {
            assert_eq!(actual, message);
        }
        other => panic!("expected query error {:?}, got {:?}", message, other),
    }
}

/// Assert that a result failed with an invariant violation.
#[track_caller]
pub fn assert_invariant<T: std::fmt::Debug>(result: TesseraResult<T>) {
    match result {
        Err(tessera::TesseraError::Invariant { .. }) => {}
        other => panic!("expected invariant violation, got {:?}", other),
    }
}

/// Assert that a result failed with an interruption.
#[track_caller]
pub fn assert_interrupted<T: std::fmt::Debug>(result: TesseraResult<T>) {
    match result {
        Err(tessera::TesseraError::Interrupted) => {}
        other => panic!("expected interruption, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_namespace_shards() {
        let ns = split_namespace(&[b"h", b"p"]);
        assert_eq!(ns.partition().len(), 3);
    }

    #[test]
    fn write_one_advances_timestamp() {
        let store = universe_store();
        set(&store, b"k", num(1.0));
        assert_eq!(store.timestamp().count(), 1);
    }
}
