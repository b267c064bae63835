//! The in-memory reference store.
//!
//! [`MemoryStore`] is the KV protocol's coherent key-set replica. It
//! keeps entries in a key-ordered index with per-key modification
//! timestamps and keeps tombstones for deletions, which is what lets the
//! backfiller emit a delta instead of the whole region. Durable state
//! (region, status flags, timestamp, entries, tombstones) is persisted
//! as one bincode frame rewritten atomically at each commit point, so a
//! reopened store restores exactly and a crash mid-backfill comes back
//! stale rather than torn. Production engines hide a B-tree and page
//! cache behind the same trait; this store trades write amplification
//! for exact crash semantics.

use crate::core::error::{TesseraError, TesseraResult};
use crate::core::interrupt::Interruptor;
use crate::core::order::{OrderRegistry, OrderToken};
use crate::core::timestamp::{StateTimestamp, TransitionTimestamp};
use crate::kv::datum::Datum;
use crate::kv::region::KeyRange;
use crate::protocol::query::{BackfillRequestLike, ReadQuery, WriteQuery};
use crate::protocol::region::RegionLike;
use crate::protocol::store::{ChunkSink, StoreOps, StoreStatus};
use crate::stream::transform::{apply_transforms, TerminalAccumulator};
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

use super::backfill::{BackfillDelete, BackfillEntry, KvBackfillChunk, KvBackfillRequest};
use super::query::{
    KeyOutcome, KvProtocol, KvRead, KvReadResponse, KvWrite, KvWriteResponse, RangeRead, Row,
    WriteOutcome,
};

/// Default number of entries per backfill chunk.
pub const DEFAULT_CHUNK_ENTRIES: usize = crate::core::config::DEFAULT_BACKFILL_CHUNK_ENTRIES;

/// A stored value and the timestamp of the write that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub(crate) datum: Datum,
    pub(crate) modified_at: StateTimestamp,
}

/// The durable state of a store, serialized wholesale at each commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    region: KeyRange,
    status: StoreStatus,
    timestamp: StateTimestamp,
    entries: BTreeMap<Vec<u8>, StoredEntry>,
    tombstones: BTreeMap<Vec<u8>, StateTimestamp>,
}

impl StoreState {
    fn fresh(region: KeyRange) -> Self {
        Self {
            region,
            status: StoreStatus::COHERENT,
            timestamp: StateTimestamp::zero(),
            entries: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }

    fn require_serving(&self) -> TesseraResult<()> {
        if !self.status.is_serving() {
            return Err(TesseraError::invariant(format!(
                "store for {} is not serving (status {:?})",
                self.region, self.status
            )));
        }
        Ok(())
    }

    fn require_receiving(&self) -> TesseraResult<()> {
        if !self.status.is_receiving() {
            return Err(TesseraError::invariant(format!(
                "store for {} is not backfilling",
                self.region
            )));
        }
        Ok(())
    }
}

/// An in-memory store with optional file persistence.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    order: Mutex<OrderRegistry>,
    persist_path: Option<PathBuf>,
    chunk_entries: usize,
}

impl MemoryStore {
    /// Create an ephemeral store for `region`, coherent and empty.
    pub fn create(region: KeyRange) -> Self {
        Self {
            state: RwLock::new(StoreState::fresh(region)),
            order: Mutex::new(OrderRegistry::new()),
            persist_path: None,
            chunk_entries: DEFAULT_CHUNK_ENTRIES,
        }
    }

    /// Create a persistent store for `region` backed by `path`.
    pub fn create_at(region: KeyRange, path: impl Into<PathBuf>) -> TesseraResult<Self> {
        let store = Self {
            state: RwLock::new(StoreState::fresh(region)),
            order: Mutex::new(OrderRegistry::new()),
            persist_path: Some(path.into()),
            chunk_entries: DEFAULT_CHUNK_ENTRIES,
        };
        let state = store.state.read().clone();
        store.persist(&state)?;
        Ok(store)
    }

    /// Reopen a persistent store from `path`.
    ///
    /// A store closed mid-backfill reopens stale: the backfilling flag is
    /// cleared, the coherent flag stays off, and the routing layer must
    /// arrange a fresh backfill.
    pub fn open(path: impl Into<PathBuf>) -> TesseraResult<Self> {
        let path = path.into();
        let mut state = load_state(&path)
            .map_err(|e| TesseraError::transient(format!("failed to open store: {:#}", e)))?;
        state.status.validate()?;
        if state.status.is_receiving() {
            tracing::warn!(region = %state.region, "store reopened mid-backfill; resuming stale");
            state.status.remove(StoreStatus::BACKFILLING);
        }
        let store = Self {
            state: RwLock::new(state),
            order: Mutex::new(OrderRegistry::new()),
            persist_path: Some(path),
            chunk_entries: DEFAULT_CHUNK_ENTRIES,
        };
        let snapshot = store.state.read().clone();
        store.persist(&snapshot)?;
        Ok(store)
    }

    /// Override the backfill chunk size.
    pub fn with_chunk_entries(mut self, chunk_entries: usize) -> Self {
        self.chunk_entries = chunk_entries.max(1);
        self
    }

    /// Destroy the store, removing its persistence file.
    pub fn destroy(self) -> TesseraResult<()> {
        if let Some(path) = &self.persist_path {
            std::fs::remove_file(path)
                .map_err(|e| TesseraError::transient(format!("failed to remove store: {}", e)))?;
        }
        Ok(())
    }

    /// Direct value lookup, bypassing the query layer. Test and debugging
    /// convenience.
    pub fn get(&self, key: &[u8]) -> Option<Datum> {
        self.state.read().entries.get(key).map(|e| e.datum.clone())
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// A deterministic fingerprint of the store's data state. Two stores
    /// with byte-identical states have equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        let state = self.state.read();
        let frame = bincode::serialize(&(
            &state.timestamp,
            &state.entries,
            &state.tombstones,
        ))
        .expect("store state is serializable");
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&frame);
        hasher.finish()
    }

    /// Entries and tombstones within `range`, for rebalancing.
    pub(crate) fn export_segment(
        &self,
        range: &KeyRange,
    ) -> (
        Vec<(Vec<u8>, StoredEntry)>,
        Vec<(Vec<u8>, StateTimestamp)>,
    ) {
        let state = self.state.read();
        let entries = range_iter(&state.entries, range)
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        let tombstones = range_iter(&state.tombstones, range)
            .map(|(k, ts)| (k.clone(), *ts))
            .collect();
        (entries, tombstones)
    }

    /// Assemble an ephemeral coherent store from parts, for rebalancing.
    pub(crate) fn from_parts(
        region: KeyRange,
        entries: BTreeMap<Vec<u8>, StoredEntry>,
        tombstones: BTreeMap<Vec<u8>, StateTimestamp>,
        timestamp: StateTimestamp,
    ) -> Self {
        Self {
            state: RwLock::new(StoreState {
                region,
                status: StoreStatus::COHERENT,
                timestamp,
                entries,
                tombstones,
            }),
            order: Mutex::new(OrderRegistry::new()),
            persist_path: None,
            chunk_entries: DEFAULT_CHUNK_ENTRIES,
        }
    }

    fn persist(&self, state: &StoreState) -> TesseraResult<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        write_state(path, state)
            .map_err(|e| TesseraError::transient(format!("failed to persist store: {:#}", e)))
    }

    /// Persist `staged` and swap it in. The in-memory state changes only
    /// after the frame is durable, so a crash at any point leaves the
    /// previous committed state.
    fn commit(
        &self,
        guard: &mut parking_lot::RwLockWriteGuard<'_, StoreState>,
        staged: StoreState,
    ) -> TesseraResult<()> {
        self.persist(&staged)?;
        **guard = staged;
        Ok(())
    }

    fn exec_range_read(
        &self,
        state: &StoreState,
        read: &RangeRead,
        interruptor: &Interruptor,
    ) -> TesseraResult<KvReadResponse> {
        if let Some(terminal) = &read.terminal {
            let mut acc = TerminalAccumulator::new(terminal);
            if !read.range.is_empty() {
                for (_key, entry) in range_iter(&state.entries, &read.range) {
                    interruptor.check()?;
                    for datum in apply_transforms(&read.transforms, entry.datum.clone())? {
                        acc.feed(&datum)?;
                    }
                }
            }
            return Ok(KvReadResponse::Terminal(acc.finish()));
        }

        let mut rows = Vec::new();
        if !read.range.is_empty() {
            for (key, entry) in range_iter(&state.entries, &read.range) {
                interruptor.check()?;
                for datum in apply_transforms(&read.transforms, entry.datum.clone())? {
                    rows.push(Row {
                        key: key.clone(),
                        datum,
                    });
                }
                // Soft cap: finish the current key, then stop, so the
                // caller's resume cursor never splits a key.
                if read.limit.is_some_and(|limit| rows.len() >= limit) {
                    break;
                }
            }
        }
        Ok(KvReadResponse::Batch(rows))
    }

    fn apply_single(
        state: &mut StoreState,
        op: &KvWrite,
        timestamp: StateTimestamp,
    ) -> TesseraResult<(Vec<u8>, WriteOutcome)> {
        match op {
            KvWrite::Set { key, value } => {
                let prior = state.entries.insert(
                    key.clone(),
                    StoredEntry {
                        datum: value.clone(),
                        modified_at: timestamp,
                    },
                );
                state.tombstones.remove(key);
                let outcome = if prior.is_some() {
                    WriteOutcome::Replaced
                } else {
                    WriteOutcome::Created
                };
                Ok((key.clone(), outcome))
            }
            KvWrite::Delete { key } => match state.entries.remove(key) {
                Some(_) => {
                    state.tombstones.insert(key.clone(), timestamp);
                    Ok((key.clone(), WriteOutcome::Deleted))
                }
                None => Ok((key.clone(), WriteOutcome::Missing)),
            },
            KvWrite::Append { key, suffix } => {
                let existing = state.entries.get(key).map(|e| e.datum.clone());
                match existing {
                    None => {
                        state.entries.insert(
                            key.clone(),
                            StoredEntry {
                                datum: suffix.clone(),
                                modified_at: timestamp,
                            },
                        );
                        state.tombstones.remove(key);
                        Ok((key.clone(), WriteOutcome::Created))
                    }
                    Some(datum) => {
                        let appended = match (&datum, suffix) {
                            (Datum::Str(a), Datum::Str(b)) => Datum::Str(format!("{}{}", a, b)),
                            (Datum::Arr(a), Datum::Arr(b)) => {
                                let mut out = a.clone();
                                out.extend(b.iter().cloned());
                                Datum::Arr(out)
                            }
                            (a, b) => {
                                return Err(TesseraError::user_query(format!(
                                    "Cannot append {} to {}.",
                                    b.type_name(),
                                    a.type_name()
                                )))
                            }
                        };
                        state.entries.insert(
                            key.clone(),
                            StoredEntry {
                                datum: appended,
                                modified_at: timestamp,
                            },
                        );
                        Ok((key.clone(), WriteOutcome::Appended))
                    }
                }
            }
            KvWrite::Batch { .. } => Err(TesseraError::invariant("nested write batch")),
        }
    }

    fn apply_write(
        state: &mut StoreState,
        write: &KvWrite,
        timestamp: StateTimestamp,
    ) -> TesseraResult<KvWriteResponse> {
        match write {
            KvWrite::Batch { ops } => {
                let mut outcomes = Vec::with_capacity(ops.len());
                for op in ops {
                    let (key, outcome) = Self::apply_single(state, op, timestamp)?;
                    outcomes.push(KeyOutcome { key, outcome });
                }
                Ok(KvWriteResponse::Batch(outcomes))
            }
            single => {
                let (_key, outcome) = Self::apply_single(state, single, timestamp)?;
                Ok(KvWriteResponse::Single(outcome))
            }
        }
    }
}

impl StoreOps<KvProtocol> for MemoryStore {
    fn region(&self) -> KeyRange {
        self.state.read().region.clone()
    }

    fn status(&self) -> StoreStatus {
        self.state.read().status
    }

    fn timestamp(&self) -> StateTimestamp {
        self.state.read().timestamp
    }

    fn read(
        &self,
        read: KvRead,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<KvReadResponse> {
        interruptor.check()?;
        self.order.lock().checkpoint(order)?;
        let state = self.state.read();
        state.require_serving()?;
        if !state.region.contains(&read.region()) {
            return Err(TesseraError::invariant(format!(
                "read region {} outside store region {}",
                read.region(),
                state.region
            )));
        }
        match &read {
            KvRead::Point { key } => Ok(KvReadResponse::Value(
                state.entries.get(key).map(|e| e.datum.clone()),
            )),
            KvRead::Range(range_read) => self.exec_range_read(&state, range_read, interruptor),
        }
    }

    fn write(
        &self,
        write: KvWrite,
        timestamp: TransitionTimestamp,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<KvWriteResponse> {
        // The commit below is atomic; once started it is not abandoned,
        // so the interrupt window closes here.
        interruptor.check()?;
        self.order.lock().checkpoint(order)?;
        let mut guard = self.state.write();
        guard.require_serving()?;
        if !guard.region.contains(&write.region()) {
            return Err(TesseraError::invariant(format!(
                "write region {} outside store region {}",
                write.region(),
                guard.region
            )));
        }
        if guard.timestamp != timestamp.before() {
            return Err(TesseraError::invariant(format!(
                "write transition {} does not start at store timestamp {}",
                timestamp, guard.timestamp
            )));
        }
        let mut staged = guard.clone();
        let response = Self::apply_write(&mut staged, &write, timestamp.after())?;
        staged.timestamp = timestamp.after();
        self.commit(&mut guard, staged)?;
        Ok(response)
    }

    fn backfillee_begin(&self) -> TesseraResult<KvBackfillRequest> {
        let mut guard = self.state.write();
        if guard.status.is_receiving() {
            return Err(TesseraError::invariant("store is already backfilling"));
        }
        let mut staged = guard.clone();
        staged.status = StoreStatus::BACKFILLING;
        self.commit(&mut guard, staged)?;
        tracing::info!(region = %guard.region, since = %guard.timestamp, "backfill receiving");
        Ok(KvBackfillRequest::new(
            guard.region.clone(),
            guard.timestamp,
        ))
    }

    fn backfillee_chunk(&self, chunk: KvBackfillChunk) -> TesseraResult<()> {
        let mut guard = self.state.write();
        guard.require_receiving()?;
        let mut staged = guard.clone();
        match chunk {
            KvBackfillChunk::Entries(entries) => {
                for entry in entries {
                    let deleted_later = staged
                        .tombstones
                        .get(&entry.key)
                        .is_some_and(|ts| *ts >= entry.modified_at);
                    let newer_locally = staged
                        .entries
                        .get(&entry.key)
                        .is_some_and(|e| e.modified_at >= entry.modified_at);
                    if deleted_later || newer_locally {
                        continue;
                    }
                    staged.tombstones.remove(&entry.key);
                    staged.entries.insert(
                        entry.key,
                        StoredEntry {
                            datum: entry.datum,
                            modified_at: entry.modified_at,
                        },
                    );
                }
            }
            KvBackfillChunk::Deletes(deletes) => {
                for delete in deletes {
                    let stale_locally = staged
                        .entries
                        .get(&delete.key)
                        .is_some_and(|e| e.modified_at < delete.deleted_at);
                    if stale_locally {
                        staged.entries.remove(&delete.key);
                    }
                    let tombstone = staged
                        .tombstones
                        .entry(delete.key)
                        .or_insert(delete.deleted_at);
                    *tombstone = (*tombstone).max(delete.deleted_at);
                }
            }
        }
        self.commit(&mut guard, staged)
    }

    fn backfillee_end(&self, timestamp: StateTimestamp) -> TesseraResult<()> {
        let mut guard = self.state.write();
        guard.require_receiving()?;
        let mut staged = guard.clone();
        staged.status = StoreStatus::COHERENT;
        staged.timestamp = timestamp;
        self.commit(&mut guard, staged)?;
        tracing::info!(region = %guard.region, at = %timestamp, "backfill received");
        Ok(())
    }

    fn backfillee_cancel(&self) -> TesseraResult<()> {
        let mut guard = self.state.write();
        guard.require_receiving()?;
        let mut staged = guard.clone();
        staged.status = StoreStatus::empty();
        self.commit(&mut guard, staged)?;
        tracing::warn!(region = %guard.region, "backfill cancelled; store is stale");
        Ok(())
    }

    fn backfiller(
        &self,
        request: KvBackfillRequest,
        chunks: &mut ChunkSink<'_, KvBackfillChunk>,
        interruptor: &Interruptor,
    ) -> TesseraResult<StateTimestamp> {
        interruptor.check()?;
        // Snapshot the delta under the lock, then stream without it so
        // the source keeps serving while chunks drain.
        let (entries, deletes, end) = {
            let state = self.state.read();
            state.require_serving()?;
            if request.region() != state.region {
                return Err(TesseraError::invariant(format!(
                    "backfill request region {} does not match source region {}",
                    request.region(),
                    state.region
                )));
            }
            if request.timestamp() > state.timestamp {
                return Err(TesseraError::invariant(format!(
                    "backfill request timestamp {} ahead of source {}",
                    request.timestamp(),
                    state.timestamp
                )));
            }
            let since = request.timestamp();
            let entries: Vec<BackfillEntry> = state
                .entries
                .iter()
                .filter(|(_, e)| e.modified_at > since)
                .map(|(k, e)| BackfillEntry {
                    key: k.clone(),
                    datum: e.datum.clone(),
                    modified_at: e.modified_at,
                })
                .collect();
            let deletes: Vec<BackfillDelete> = state
                .tombstones
                .iter()
                .filter(|(_, ts)| **ts > since)
                .map(|(k, ts)| BackfillDelete {
                    key: k.clone(),
                    deleted_at: *ts,
                })
                .collect();
            (entries, deletes, state.timestamp)
        };

        for chunk in entries.chunks(self.chunk_entries) {
            interruptor.check()?;
            chunks(KvBackfillChunk::Entries(chunk.to_vec()))?;
        }
        for chunk in deletes.chunks(self.chunk_entries) {
            interruptor.check()?;
            chunks(KvBackfillChunk::Deletes(chunk.to_vec()))?;
        }
        Ok(end)
    }
}

/// Iterate a key-ordered map over the keys of `range`.
fn range_iter<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    range: &KeyRange,
) -> Box<dyn Iterator<Item = (&'a Vec<u8>, &'a V)> + 'a> {
    if range.is_empty() {
        return Box::new(std::iter::empty());
    }
    let start = Bound::Included(range.start());
    match range.end() {
        Some(end) => Box::new(map.range::<[u8], _>((start, Bound::Excluded(end)))),
        None => Box::new(map.range::<[u8], _>((start, Bound::Unbounded))),
    }
}

fn write_state(path: &Path, state: &StoreState) -> anyhow::Result<()> {
    let frame = bincode::serialize(state).context("failed to serialize store state")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &frame).context("failed to write store state")?;
    std::fs::rename(&tmp, path).context("failed to commit store state")?;
    Ok(())
}

fn load_state(path: &Path) -> anyhow::Result<StoreState> {
    let frame = std::fs::read(path).context("failed to read store state")?;
    bincode::deserialize(&frame).context("failed to decode store state")
}
