//! Partition tables.
//!
//! A partition is a validated set of pairwise-disjoint regions kept in
//! canonical order. The facade uses it to select the covering subset for
//! a query region; because the order is canonical, shard dispatch always
//! touches stores in the same order and concatenated range results come
//! back in key order.

use crate::core::error::{TesseraError, TesseraResult};
use crate::protocol::region::RegionLike;

/// A disjoint set of regions in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<R: RegionLike> {
    regions: Vec<R>,
}

impl<R: RegionLike> Partition<R> {
    /// Build a partition from `regions`.
    ///
    /// Fails if any region is empty or any two regions overlap. The
    /// regions are re-ordered canonically; callers that track per-region
    /// resources should index through [`Partition::regions`].
    pub fn new(mut regions: Vec<R>) -> TesseraResult<Self> {
        if regions.iter().any(|r| r.is_empty()) {
            return Err(TesseraError::invariant("partition member region is empty"));
        }
        regions.sort();
        for pair in regions.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(TesseraError::invariant(format!(
                    "partition regions overlap: {:?} and {:?}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { regions })
    }

    /// The member regions, in canonical order.
    pub fn regions(&self) -> &[R] {
        &self.regions
    }

    /// Number of member regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check whether the partition has no members.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Indices of the members overlapping `target`, in canonical order.
    pub fn cover_indices(&self, target: &R) -> Vec<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.overlaps(target))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Check whether the members overlapping `target` cover all of it.
    pub fn covers(&self, target: &R) -> bool {
        target.covered_by(&self.regions)
    }
}
