//! The region algebra.
//!
//! A region is a value representing a subset of the keyspace. Not every
//! set of keys is expressible; each protocol chooses a lattice (key
//! ranges, hash-prefix buckets, or pairs thereof) that is closed under
//! intersection. Union is expressed only through the coverage predicate,
//! consistent with not all set unions being representable.
//!
//! Laws every implementation must satisfy:
//!
//! - `a.contains(b)` iff `b.covered_by(&[a])`.
//! - `a.intersection(b) == b.intersection(a)`.
//! - `a.covered_by(&[a])` for every `a`.
//! - `contains(x)` implies `overlaps(x)` or `x.is_empty()`.
//! - The intersection of non-overlapping regions is the empty region, and
//!   the empty region is `covered_by(&[])`.
//! - Equality is structural: two regions compare equal iff they represent
//!   the same key set, so implementations keep a canonical form.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A representable subset of the keyspace.
///
/// Regions are plain values: structurally comparable, serializable, with
/// no hidden identity. The `Ord` bound provides the canonical order the
/// dispatch layer uses to acquire shard resources without lock cycles;
/// it is an arbitrary total order consistent with equality, not a
/// set-theoretic one.
pub trait RegionLike:
    Clone + Eq + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The empty region.
    fn empty() -> Self;

    /// Check whether this region contains no keys.
    fn is_empty(&self) -> bool;

    /// Check whether this region is a superset of `other`.
    fn contains(&self, other: &Self) -> bool;

    /// Check whether this region shares at least one key with `other`.
    fn overlaps(&self, other: &Self) -> bool;

    /// The region of all keys in both this region and `other`.
    fn intersection(&self, other: &Self) -> Self;

    /// Check whether the union of `cover` is a superset of this region.
    fn covered_by(&self, cover: &[Self]) -> bool;
}

/// Check that `regions` are pairwise non-overlapping.
pub fn pairwise_disjoint<R: RegionLike>(regions: &[R]) -> bool {
    for (i, a) in regions.iter().enumerate() {
        for b in regions.iter().skip(i + 1) {
            if a.overlaps(b) {
                return false;
            }
        }
    }
    true
}
