//! Repartitioning a set of KV stores.
//!
//! `rebalance` reshapes stores covering some region into a new disjoint
//! partition of the same region. A store whose region survives unchanged
//! in the goal list is moved through untouched; every other goal store is
//! assembled from the overlapping slices of the inputs, and inputs that
//! were only copied from are destroyed. No entry is lost or duplicated:
//! the multiset of (key, value) pairs is preserved exactly.

use crate::core::error::TesseraResult;
use crate::core::interrupt::Interruptor;
use crate::core::timestamp::StateTimestamp;
use crate::kv::region::KeyRange;
use crate::kv::store::MemoryStore;
use crate::protocol::rebalance::validate_rebalance;
use crate::protocol::region::RegionLike;
use crate::protocol::store::StoreOps;
use std::collections::BTreeMap;

/// Reshape `recyclees` into one store per goal region.
///
/// Preconditions: recyclee regions pairwise disjoint, goal regions
/// pairwise disjoint, and both sides cover the same keys. All recyclees
/// must be serving. On success the i-th returned store owns exactly
/// `goals[i]`; each input was either moved into the result or destroyed.
///
/// Interruptible: between goal builds the interruptor is checked, and on
/// interruption the error is returned with all partially built stores
/// dropped. Callers rebuild from durable store state.
pub fn rebalance(
    recyclees: Vec<MemoryStore>,
    goals: &[KeyRange],
    interruptor: &Interruptor,
) -> TesseraResult<Vec<MemoryStore>> {
    let regions: Vec<KeyRange> = recyclees.iter().map(|s| s.region()).collect();
    validate_rebalance(&regions, goals)?;

    tracing::info!(
        recyclees = recyclees.len(),
        goals = goals.len(),
        "rebalance started"
    );

    // A recyclee whose region equals a goal moves through unchanged;
    // everything else is a copy source.
    let mut slots: Vec<Option<MemoryStore>> = recyclees.into_iter().map(Some).collect();
    let mut outputs: Vec<Option<MemoryStore>> = goals.iter().map(|_| None).collect();

    for (goal_idx, goal) in goals.iter().enumerate() {
        if let Some(source_idx) = regions.iter().position(|r| r == goal) {
            if let Some(store) = slots[source_idx].take() {
                outputs[goal_idx] = Some(store);
            }
        }
    }

    for (goal_idx, goal) in goals.iter().enumerate() {
        if outputs[goal_idx].is_some() {
            continue;
        }
        interruptor.check()?;

        let mut entries = BTreeMap::new();
        let mut tombstones = BTreeMap::new();
        let mut timestamp = StateTimestamp::zero();
        for (source_idx, region) in regions.iter().enumerate() {
            if !region.overlaps(goal) {
                continue;
            }
            let source = slots[source_idx]
                .as_ref()
                .expect("copy source consumed by an equal goal it does not equal");
            let slice = region.intersection(goal);
            let (segment_entries, segment_tombstones) = source.export_segment(&slice);
            entries.extend(segment_entries);
            tombstones.extend(segment_tombstones);
            timestamp = timestamp.max(source.timestamp());
        }
        tracing::debug!(goal = %goal, entries = entries.len(), "rebalance goal assembled");
        outputs[goal_idx] = Some(MemoryStore::from_parts(
            goal.clone(),
            entries,
            tombstones,
            timestamp,
        ));
    }

    // Inputs that were only copied from are no longer needed.
    for leftover in slots.into_iter().flatten() {
        leftover.destroy()?;
    }

    let outputs: Vec<MemoryStore> = outputs
        .into_iter()
        .map(|store| store.expect("every goal produced a store"))
        .collect();
    tracing::info!(goals = outputs.len(), "rebalance complete");
    Ok(outputs)
}
