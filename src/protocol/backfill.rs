//! The backfill exchange driver.
//!
//! Replication and migration are both expressed as a backfill: one store
//! (the backfillee) receives the state of another (the backfiller). The
//! exchange is begin → chunk* → end, with cancel on any failure so the
//! backfillee is left stale rather than torn:
//!
//! 1. `backfillee_begin()` snapshots the receiver's region and timestamp
//!    into a request and durably marks it receiving.
//! 2. `backfiller(request, ...)` streams chunks until the source state at
//!    some timestamp `end` is fully conveyed. The source keeps serving.
//! 3. Each chunk is forwarded to `backfillee_chunk`.
//! 4. `backfillee_end(end)` makes the receiver coherent at `end`; on any
//!    error `backfillee_cancel()` runs instead.

use crate::core::error::TesseraResult;
use crate::core::interrupt::Interruptor;
use crate::core::timestamp::StateTimestamp;
use crate::protocol::query::{BackfillRequestLike, Protocol};
use crate::protocol::store::StoreOps;

/// Counters describing one completed or aborted backfill exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Chunks forwarded to the backfillee.
    pub chunks: u64,
}

/// Copy state from `source` into `backfillee`.
///
/// On success the backfillee is coherent at the returned timestamp and
/// its content equals the source content at that timestamp. On any error
/// (including interruption) the backfillee is cancelled back to stale
/// (`¬coherent ∧ ¬backfilling`) and the error is returned; the source is
/// unchanged either way.
pub fn run_backfill<P, B, S>(
    backfillee: &B,
    source: &S,
    interruptor: &Interruptor,
) -> TesseraResult<StateTimestamp>
where
    P: Protocol,
    B: StoreOps<P> + ?Sized,
    S: StoreOps<P> + ?Sized,
{
    let request = backfillee.backfillee_begin()?;
    let since = request.timestamp();
    tracing::info!(since = %since, "backfill started");

    let mut stats = BackfillStats::default();
    let mut forward = |chunk: P::BackfillChunk| {
        stats.chunks += 1;
        backfillee.backfillee_chunk(chunk)
    };

    match source.backfiller(request, &mut forward, interruptor) {
        Ok(end) => {
            backfillee.backfillee_end(end)?;
            tracing::info!(end = %end, chunks = stats.chunks, "backfill complete");
            Ok(end)
        }
        Err(err) => {
            backfillee.backfillee_cancel()?;
            tracing::warn!(chunks = stats.chunks, error = %err, "backfill aborted");
            Err(err)
        }
    }
}
