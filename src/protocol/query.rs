//! The query algebra: sharding and unsharding of reads and writes.
//!
//! A query is an opaque serializable value with an associated region. A
//! read depends on every key in its region; a write depends on and may
//! modify keys in its region. The clustering layer splits a query across
//! a disjoint cover of its region with `shard` and recombines the
//! per-store responses with `unshard`; the composition must be
//! indistinguishable from executing the whole query on one store
//! covering its full region.

use crate::core::error::TesseraResult;
use crate::core::timestamp::StateTimestamp;
use crate::protocol::cache::TemporaryCache;
use crate::protocol::region::RegionLike;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Bound on every plain value that crosses a store boundary.
pub trait BoundaryValue:
    Clone + Debug + PartialEq + Send + Serialize + DeserializeOwned + 'static
{
}

impl<T> BoundaryValue for T where
    T: Clone + Debug + PartialEq + Send + Serialize + DeserializeOwned + 'static
{
}

/// A read query.
pub trait ReadQuery<P: Protocol>: BoundaryValue {
    /// The keys this read depends on.
    fn region(&self) -> P::Region;

    /// Break the read into one sub-read per cover region.
    ///
    /// Preconditions: the union of `regions` is a superset of
    /// `self.region()` and the regions are pairwise non-overlapping.
    /// Postconditions: the result has one entry per input region, and the
    /// i-th sub-read's region is a subset of `regions[i]`. Sharding is
    /// deterministic: equal inputs produce structurally equal outputs.
    fn shard(&self, regions: &[P::Region]) -> Vec<Self>;

    /// Recombine responses to the sub-reads produced by [`shard`].
    ///
    /// `responses[i]` must be the genuine response of executing the i-th
    /// sub-read, in matching order. The result equals what a single store
    /// covering the full region would have returned. Pure modulo the
    /// temporary cache: a fresh cache and a shared cache yield the same
    /// value.
    ///
    /// [`shard`]: ReadQuery::shard
    fn unshard(
        &self,
        responses: Vec<P::ReadResponse>,
        cache: &TemporaryCache,
    ) -> TesseraResult<P::ReadResponse>;
}

/// A write query.
///
/// The decomposition law implies each sub-write affects only keys in its
/// own region.
pub trait WriteQuery<P: Protocol>: BoundaryValue {
    /// The keys this write depends on or may modify.
    fn region(&self) -> P::Region;

    /// Break the write into one sub-write per cover region. Same contract
    /// as [`ReadQuery::shard`].
    fn shard(&self, regions: &[P::Region]) -> Vec<Self>;

    /// Recombine responses to the sub-writes. Same contract as
    /// [`ReadQuery::unshard`], modulo each store applying its sub-write
    /// under its own transition timestamp.
    fn unshard(
        &self,
        responses: Vec<P::WriteResponse>,
        cache: &TemporaryCache,
    ) -> TesseraResult<P::WriteResponse>;
}

/// Introspection of a backfill request.
pub trait BackfillRequestLike<P: Protocol>: BoundaryValue {
    /// The backfillee's region.
    fn region(&self) -> P::Region;

    /// The backfillee's timestamp when the backfill began.
    fn timestamp(&self) -> StateTimestamp;
}

/// The type bundle binding one storage protocol into the clustering core.
///
/// Specialised engines (document scans with pushdown pipelines, point
/// ops, secondary-index reads) implement this once; the clustering layer
/// routes, replicates, and reshards without knowing their internals.
pub trait Protocol: Sized + Send + Sync + 'static {
    /// The region lattice of this protocol.
    type Region: RegionLike;

    /// Read queries.
    type Read: ReadQuery<Self>;

    /// Write queries.
    type Write: WriteQuery<Self>;

    /// Responses to reads.
    type ReadResponse: BoundaryValue;

    /// Responses to writes.
    type WriteResponse: BoundaryValue;

    /// Opening handshake of a backfill exchange.
    type BackfillRequest: BackfillRequestLike<Self>;

    /// One delta of a backfill exchange.
    type BackfillChunk: BoundaryValue;
}
