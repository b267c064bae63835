//! KV backfill wire types.
//!
//! A backfill request names the backfillee's region and the timestamp it
//! already has; the source answers with the delta between that timestamp
//! and its own state at some consistent end timestamp. Deltas travel as
//! chunks of live entries and tombstoned deletions, each stamped with the
//! timestamp of the write that produced it so chunk application is
//! idempotent and resume-safe.

use crate::core::timestamp::StateTimestamp;
use crate::kv::datum::Datum;
use crate::kv::region::KeyRange;
use crate::protocol::query::BackfillRequestLike;
use serde::{Deserialize, Serialize};

use super::query::KvProtocol;

/// The opening handshake of a KV backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvBackfillRequest {
    region: KeyRange,
    since: StateTimestamp,
}

impl KvBackfillRequest {
    pub(crate) fn new(region: KeyRange, since: StateTimestamp) -> Self {
        Self { region, since }
    }

    /// The timestamp the backfillee's state already reflects.
    pub fn since(&self) -> StateTimestamp {
        self.since
    }
}

impl BackfillRequestLike<KvProtocol> for KvBackfillRequest {
    fn region(&self) -> KeyRange {
        self.region.clone()
    }

    fn timestamp(&self) -> StateTimestamp {
        self.since
    }
}

/// A live entry carried by a backfill chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillEntry {
    pub key: Vec<u8>,
    pub datum: Datum,
    /// Timestamp of the write that last modified this key.
    pub modified_at: StateTimestamp,
}

/// A deletion carried by a backfill chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillDelete {
    pub key: Vec<u8>,
    /// Timestamp of the delete.
    pub deleted_at: StateTimestamp,
}

/// One delta of a KV backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvBackfillChunk {
    /// Entries written since the request timestamp.
    Entries(Vec<BackfillEntry>),
    /// Keys deleted since the request timestamp.
    Deletes(Vec<BackfillDelete>),
}
