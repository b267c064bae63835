//! KV reads and writes, and their shard/unshard decomposition.
//!
//! Reads are point lookups or range scans; a range scan carries the
//! pushdown transformation stack and optional terminal a lazy stream
//! lowers onto it. Writes are single-key operations (`Set`, `Delete`,
//! and the atomic read-modify-write `Append`) or a multi-key batch whose
//! per-store slices commit independently: the batch promises per-key
//! atomicity only, never cross-key atomicity.

use crate::core::error::{TesseraError, TesseraResult};
use crate::kv::datum::Datum;
use crate::kv::region::KeyRange;
use crate::protocol::cache::TemporaryCache;
use crate::protocol::query::{Protocol, ReadQuery, WriteQuery};
use crate::protocol::region::RegionLike;
use crate::stream::transform::{merge_terminal_results, Terminal, TerminalResult, Transform};
use serde::{Deserialize, Serialize};

use super::backfill::{KvBackfillChunk, KvBackfillRequest};

/// The KV protocol bundle: key-range regions, document values, pushdown
/// range scans.
#[derive(Debug, Clone, Copy)]
pub struct KvProtocol;

impl Protocol for KvProtocol {
    type Region = KeyRange;
    type Read = KvRead;
    type Write = KvWrite;
    type ReadResponse = KvReadResponse;
    type WriteResponse = KvWriteResponse;
    type BackfillRequest = KvBackfillRequest;
    type BackfillChunk = KvBackfillChunk;
}

/// A range scan with pushdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRead {
    /// Keys to scan, in key order.
    pub range: KeyRange,
    /// Transformations applied to each stored value, in order.
    pub transforms: Vec<Transform>,
    /// Terminal aggregation, if the read is a lowered stream terminal.
    pub terminal: Option<Terminal>,
    /// Soft cap on returned elements. The scan stops after the source
    /// key that reaches the cap, never splitting one key's expansion
    /// across batches.
    pub limit: Option<usize>,
}

impl RangeRead {
    /// Scan a whole range with no pushdown.
    pub fn scan(range: KeyRange) -> Self {
        Self {
            range,
            transforms: Vec::new(),
            terminal: None,
            limit: None,
        }
    }
}

/// A read query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvRead {
    /// Look up a single key.
    Point { key: Vec<u8> },
    /// Scan a range.
    Range(RangeRead),
}

/// One element of a range-scan response: the transformed value together
/// with the source key it came from (the resume cursor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: Vec<u8>,
    pub datum: Datum,
}

/// A response to a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvReadResponse {
    /// Point lookup result.
    Value(Option<Datum>),
    /// One page of a range scan, in key order.
    Batch(Vec<Row>),
    /// Result of a lowered terminal.
    Terminal(TerminalResult),
}

impl ReadQuery<KvProtocol> for KvRead {
    fn region(&self) -> KeyRange {
        match self {
            Self::Point { key } => KeyRange::point(key),
            Self::Range(read) => read.range.clone(),
        }
    }

    fn shard(&self, regions: &[KeyRange]) -> Vec<Self> {
        match self {
            Self::Point { key } => regions
                .iter()
                .map(|region| {
                    if region.contains_key(key) {
                        Self::Point { key: key.clone() }
                    } else {
                        // Disjoint cover: every other region gets a
                        // vacuous scan so shard outputs line up with
                        // cover regions.
                        Self::Range(RangeRead::scan(KeyRange::empty()))
                    }
                })
                .collect(),
            Self::Range(read) => regions
                .iter()
                .map(|region| {
                    Self::Range(RangeRead {
                        range: read.range.intersection(region),
                        transforms: read.transforms.clone(),
                        terminal: read.terminal.clone(),
                        limit: read.limit,
                    })
                })
                .collect(),
        }
    }

    fn unshard(
        &self,
        responses: Vec<KvReadResponse>,
        cache: &TemporaryCache,
    ) -> TesseraResult<KvReadResponse> {
        match self {
            Self::Point { .. } => {
                for response in responses {
                    if let KvReadResponse::Value(value) = response {
                        return Ok(KvReadResponse::Value(value));
                    }
                }
                Err(TesseraError::invariant(
                    "point read produced no value response",
                ))
            }
            Self::Range(read) => match &read.terminal {
                Some(terminal) => {
                    let mut shard_results = Vec::with_capacity(responses.len());
                    for response in responses {
                        match response {
                            KvReadResponse::Terminal(result) => shard_results.push(result),
                            other => {
                                return Err(TesseraError::invariant(format!(
                                    "terminal read produced {:?}",
                                    other
                                )))
                            }
                        }
                    }
                    let merged = merge_terminal_results(terminal, shard_results, cache)?;
                    Ok(KvReadResponse::Terminal(merged))
                }
                None => {
                    // Cover regions arrive in canonical (key) order, so
                    // concatenation preserves global key order.
                    let mut rows = Vec::new();
                    for response in responses {
                        match response {
                            KvReadResponse::Batch(batch) => rows.extend(batch),
                            other => {
                                return Err(TesseraError::invariant(format!(
                                    "range read produced {:?}",
                                    other
                                )))
                            }
                        }
                    }
                    if let Some(limit) = read.limit {
                        truncate_at_key_boundary(&mut rows, limit);
                    }
                    Ok(KvReadResponse::Batch(rows))
                }
            },
        }
    }
}

/// Drop rows past `limit`, but never split one source key's rows across
/// the cut: the resume cursor advances whole keys at a time.
fn truncate_at_key_boundary(rows: &mut Vec<Row>, limit: usize) {
    if limit == 0 {
        rows.clear();
        return;
    }
    if rows.len() <= limit {
        return;
    }
    let boundary_key = rows[limit - 1].key.clone();
    let mut cut = limit;
    while cut < rows.len() && rows[cut].key == boundary_key {
        cut += 1;
    }
    rows.truncate(cut);
}

/// A write query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvWrite {
    /// Store `value` at `key`, replacing any existing value.
    Set { key: Vec<u8>, value: Datum },
    /// Remove `key`.
    Delete { key: Vec<u8> },
    /// Atomically append `suffix` to the value at `key` (string to
    /// string, array to array). A missing key is created with `suffix`
    /// as its value.
    Append { key: Vec<u8>, suffix: Datum },
    /// Several single-key operations. Each store applies its slice
    /// atomically; across stores there is no atomicity.
    Batch { ops: Vec<KvWrite> },
}

impl KvWrite {
    /// The key of a single-key operation.
    pub fn key(&self) -> TesseraResult<&[u8]> {
        match self {
            Self::Set { key, .. } | Self::Delete { key } | Self::Append { key, .. } => Ok(key),
            Self::Batch { .. } => Err(TesseraError::invariant("nested write batch")),
        }
    }
}

/// What one single-key operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// A new key was created.
    Created,
    /// An existing value was replaced.
    Replaced,
    /// An existing key was removed.
    Deleted,
    /// A delete targeted a missing key.
    Missing,
    /// A suffix was appended to an existing value.
    Appended,
}

/// Outcome of one batch member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOutcome {
    pub key: Vec<u8>,
    pub outcome: WriteOutcome,
}

/// A response to a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvWriteResponse {
    /// Outcome of a single-key write.
    Single(WriteOutcome),
    /// Outcomes of a batch's members, in application order.
    Batch(Vec<KeyOutcome>),
}

impl WriteQuery<KvProtocol> for KvWrite {
    fn region(&self) -> KeyRange {
        match self {
            Self::Set { key, .. } | Self::Delete { key } | Self::Append { key, .. } => {
                KeyRange::point(key)
            }
            Self::Batch { ops } => KeyRange::hull_of_keys(
                ops.iter().filter_map(|op| op.key().ok()),
            ),
        }
    }

    fn shard(&self, regions: &[KeyRange]) -> Vec<Self> {
        match self {
            Self::Batch { ops } => regions
                .iter()
                .map(|region| Self::Batch {
                    ops: ops
                        .iter()
                        .filter(|op| {
                            op.key().map(|k| region.contains_key(k)).unwrap_or(false)
                        })
                        .cloned()
                        .collect(),
                })
                .collect(),
            single => regions
                .iter()
                .map(|region| {
                    let key = single
                        .key()
                        .expect("single-key write always names a key");
                    if region.contains_key(key) {
                        single.clone()
                    } else {
                        Self::Batch { ops: Vec::new() }
                    }
                })
                .collect(),
        }
    }

    fn unshard(
        &self,
        responses: Vec<KvWriteResponse>,
        _cache: &TemporaryCache,
    ) -> TesseraResult<KvWriteResponse> {
        match self {
            Self::Batch { ops } => {
                // Restore issue order: each op's outcome sits at the head
                // of exactly one shard response (keys route to one shard
                // and shards preserve relative order).
                let mut queues: Vec<std::collections::VecDeque<KeyOutcome>> = responses
                    .into_iter()
                    .map(|response| match response {
                        KvWriteResponse::Batch(outcomes) => Ok(outcomes.into()),
                        other => Err(TesseraError::invariant(format!(
                            "batch write produced {:?}",
                            other
                        ))),
                    })
                    .collect::<TesseraResult<_>>()?;
                let mut merged = Vec::with_capacity(ops.len());
                for op in ops {
                    let key = op.key()?;
                    let outcome = queues
                        .iter_mut()
                        .find_map(|queue| {
                            if queue.front().map(|o| o.key.as_slice()) == Some(key) {
                                queue.pop_front()
                            } else {
                                None
                            }
                        })
                        .ok_or_else(|| {
                            TesseraError::invariant("batch write outcome missing for key")
                        })?;
                    merged.push(outcome);
                }
                Ok(KvWriteResponse::Batch(merged))
            }
            _ => {
                for response in responses {
                    if let KvWriteResponse::Single(outcome) = response {
                        return Ok(KvWriteResponse::Single(outcome));
                    }
                }
                Err(TesseraError::invariant(
                    "single-key write produced no outcome",
                ))
            }
        }
    }
}
