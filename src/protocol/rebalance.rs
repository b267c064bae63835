//! Validation shared by protocol rebalancers.
//!
//! A rebalance reshapes a set of stores covering some region into a new
//! partition of the same region. The shape checks are protocol-agnostic
//! and live here; the actual store surgery is per-protocol.

use crate::core::error::{TesseraError, TesseraResult};
use crate::protocol::region::{pairwise_disjoint, RegionLike};

/// Check the preconditions of a rebalance: both sides pairwise disjoint
/// and covering the same keys.
pub fn validate_rebalance<R: RegionLike>(current: &[R], goals: &[R]) -> TesseraResult<()> {
    if !pairwise_disjoint(current) {
        return Err(TesseraError::invariant("recyclee regions overlap"));
    }
    if !pairwise_disjoint(goals) {
        return Err(TesseraError::invariant("goal regions overlap"));
    }
    for region in current {
        if !region.covered_by(goals) {
            return Err(TesseraError::invariant(format!(
                "recyclee region {:?} not covered by goals",
                region
            )));
        }
    }
    for goal in goals {
        if !goal.covered_by(current) {
            return Err(TesseraError::invariant(format!(
                "goal region {:?} not covered by recyclees",
                goal
            )));
        }
    }
    Ok(())
}
