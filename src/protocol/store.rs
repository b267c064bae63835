//! The store contract: a coherent key-set replica.
//!
//! A store owns the persistent state for one region, fixed at
//! construction. Besides data it carries two durable flags whose
//! combinations form the store state machine:
//!
//! ```text
//! coherent ∧ ¬backfilling   serving
//! ¬coherent ∧ ¬backfilling  stale (must backfill before serving)
//! ¬coherent ∧ backfilling   receiving
//! coherent ∧ backfilling    forbidden
//! ```
//!
//! Reads and writes are allowed only while serving. `backfillee_begin`
//! moves serving or stale to receiving; `backfillee_end` moves receiving
//! to serving; `backfillee_cancel` moves receiving to stale.

use crate::core::error::{TesseraError, TesseraResult};
use crate::core::interrupt::Interruptor;
use crate::core::order::OrderToken;
use crate::core::timestamp::{StateTimestamp, TransitionTimestamp};
use crate::protocol::query::Protocol;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Durable store status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StoreStatus: u8 {
        /// The state is a valid replica of the region's logical content.
        const COHERENT = 0b0000_0001;
        /// A backfill is currently being received.
        const BACKFILLING = 0b0000_0010;
    }
}

impl Default for StoreStatus {
    fn default() -> Self {
        Self::COHERENT
    }
}

impl StoreStatus {
    /// Check whether the store may serve reads and writes.
    pub fn is_serving(self) -> bool {
        self.contains(Self::COHERENT) && !self.contains(Self::BACKFILLING)
    }

    /// Check whether the store is receiving a backfill.
    pub fn is_receiving(self) -> bool {
        self.contains(Self::BACKFILLING)
    }

    /// Fail if the flags are in the forbidden combination.
    pub fn validate(self) -> TesseraResult<()> {
        if self.contains(Self::COHERENT | Self::BACKFILLING) {
            return Err(TesseraError::invariant(
                "store cannot be coherent while backfilling",
            ));
        }
        Ok(())
    }
}

/// Serially delivers backfill chunks from source to receiver.
///
/// Called serially from the source's viewpoint; the receiver may run it
/// on any thread. Must not re-enter the source store.
pub type ChunkSink<'a, C> = dyn FnMut(C) -> TesseraResult<()> + Send + 'a;

/// Operations every store of a protocol supports.
///
/// Many readers and writers may use a store concurrently; serialization
/// of effects is the store's own responsibility. Every operation's effect
/// is observed as instantaneous: a read issued after a write's commit
/// point sees that write.
pub trait StoreOps<P: Protocol>: Send + Sync {
    /// The region passed at construction. Immutable.
    fn region(&self) -> P::Region;

    /// Current durable status flags.
    fn status(&self) -> StoreStatus;

    /// Check whether the state is a valid replica of the region content.
    fn is_coherent(&self) -> bool {
        self.status().contains(StoreStatus::COHERENT)
    }

    /// Check whether a backfill is in progress.
    fn is_backfilling(&self) -> bool {
        self.status().contains(StoreStatus::BACKFILLING)
    }

    /// The store's current state timestamp.
    ///
    /// Meaningful only while not backfilling; mid-backfill the state is
    /// a mixture and carries no single timestamp.
    fn timestamp(&self) -> StateTimestamp;

    /// Perform a read. Never mutates state.
    ///
    /// Preconditions: `read.region()` is a subset of `self.region()` and
    /// the store is serving. On interrupt the call returns or fails with
    /// `Interrupted` within bounded time. Reads may run in parallel; each
    /// observes some point between the writes that bracket it.
    fn read(
        &self,
        read: P::Read,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<P::ReadResponse>;

    /// Perform a write.
    ///
    /// Preconditions: region containment, serving, and
    /// `self.timestamp() == timestamp.before()`. On success the store's
    /// timestamp is `timestamp.after()` and the effect on state is a
    /// deterministic function of (prior state, write, timestamp): two
    /// stores in the same state applying the same arguments reach
    /// byte-identical states. On interrupt the write may or may not have
    /// committed but is never left torn.
    fn write(
        &self,
        write: P::Write,
        timestamp: TransitionTimestamp,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<P::WriteResponse>;

    /// Prepare to receive a backfill.
    ///
    /// Fails if already backfilling. Afterwards the store is receiving
    /// (`¬coherent ∧ backfilling`, durably) and the returned request
    /// names this store's region and pre-backfill timestamp.
    fn backfillee_begin(&self) -> TesseraResult<P::BackfillRequest>;

    /// Apply one chunk of a running backfill. Fails if not backfilling.
    fn backfillee_chunk(&self, chunk: P::BackfillChunk) -> TesseraResult<()>;

    /// Complete a backfill: the store becomes coherent at `timestamp`
    /// and stops backfilling.
    fn backfillee_end(&self, timestamp: StateTimestamp) -> TesseraResult<()>;

    /// Abandon a backfill: the store stops backfilling and remains
    /// incoherent (stale).
    fn backfillee_cancel(&self) -> TesseraResult<()>;

    /// Send a backfill to another store.
    ///
    /// `request` is the receiver's [`backfillee_begin`] result. Emits
    /// each delta through `chunks` and blocks until the source state at
    /// the returned timestamp is fully conveyed. The source remains
    /// serving throughout and its timestamp is unchanged on return; the
    /// emitted chunks, combined with the receiver's starting timestamp,
    /// reconstruct the source state at the returned timestamp even as
    /// later writes continue on the source. Preconditions:
    /// `request.region() == self.region()`,
    /// `request.timestamp() <= self.timestamp()`, and the source is
    /// serving. On interrupt the backfill may be left incomplete and the
    /// receiver must cancel.
    ///
    /// [`backfillee_begin`]: StoreOps::backfillee_begin
    fn backfiller(
        &self,
        request: P::BackfillRequest,
        chunks: &mut ChunkSink<'_, P::BackfillChunk>,
        interruptor: &Interruptor,
    ) -> TesseraResult<StateTimestamp>;
}
