//! The namespace facade: the outward entry point for reads and writes.
//!
//! For each incoming query the facade computes the query region, selects
//! the covering disjoint partition of shard stores, dispatches the
//! sharded sub-queries in parallel, and recombines the responses with
//! `unshard` and the shared temporary cache. Pulsing the interruptor
//! cancels every in-flight dispatch and surfaces `Interrupted`.
//!
//! Write dispatch serializes per shard: each shard's write window
//! allocates the transition timestamp from the store's current
//! timestamp, so successive writes chain and concurrent writers to one
//! shard cannot race the allocation. Shards are always visited in the
//! partition's canonical order, which keeps resource acquisition
//! cycle-free under parallel dispatch.

use crate::core::config::CoreConfig;
use crate::core::error::{TesseraError, TesseraResult};
use crate::core::interrupt::Interruptor;
use crate::core::order::OrderToken;
use crate::core::timestamp::TransitionTimestamp;
use crate::namespace::routing::Partition;
use crate::protocol::cache::TemporaryCache;
use crate::protocol::query::{Protocol, ReadQuery, WriteQuery};
use crate::protocol::region::RegionLike;
use crate::protocol::store::StoreOps;
use parking_lot::Mutex;
use std::sync::Arc;

struct NamespaceShard<P: Protocol> {
    store: Arc<dyn StoreOps<P>>,
    write_window: Mutex<()>,
}

/// A namespace: one logical key-value table served by a partition of
/// shard stores.
pub struct Namespace<P: Protocol> {
    partition: Partition<P::Region>,
    shards: Vec<NamespaceShard<P>>,
    cache: TemporaryCache,
    config: CoreConfig,
}

impl<P: Protocol> std::fmt::Debug for Namespace<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("partition", &self.partition)
            .field("shard_count", &self.shards.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<P: Protocol> Namespace<P> {
    /// Build a namespace over `stores`, whose regions must form a
    /// disjoint partition. Store order is normalized to the partition's
    /// canonical order.
    pub fn new(stores: Vec<Arc<dyn StoreOps<P>>>, config: CoreConfig) -> TesseraResult<Self> {
        let mut keyed: Vec<(P::Region, Arc<dyn StoreOps<P>>)> = stores
            .into_iter()
            .map(|store| (store.region(), store))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let partition = Partition::new(keyed.iter().map(|(region, _)| region.clone()).collect())?;
        let shards = keyed
            .into_iter()
            .map(|(_, store)| NamespaceShard {
                store,
                write_window: Mutex::new(()),
            })
            .collect();
        Ok(Self {
            partition,
            shards,
            cache: TemporaryCache::new(),
            config,
        })
    }

    /// The shard partition, in canonical order.
    pub fn partition(&self) -> &Partition<P::Region> {
        &self.partition
    }

    /// The core configuration this namespace runs with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The temporary cache shared by this namespace's unshard calls.
    pub fn cache(&self) -> &TemporaryCache {
        &self.cache
    }

    fn cover_for(&self, target: &P::Region) -> TesseraResult<Vec<usize>> {
        let indices = self.partition.cover_indices(target);
        let selected: Vec<P::Region> = indices
            .iter()
            .map(|&idx| self.partition.regions()[idx].clone())
            .collect();
        if !target.covered_by(&selected) {
            return Err(TesseraError::transient(format!(
                "no serving cover for region {:?}",
                target
            )));
        }
        Ok(indices)
    }

    /// Perform a read on the namespace.
    pub fn read(
        &self,
        read: P::Read,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<P::ReadResponse> {
        let target = <P::Read as ReadQuery<P>>::region(&read);
        let indices = self.cover_for(&target)?;
        let cover: Vec<P::Region> = indices
            .iter()
            .map(|&idx| self.partition.regions()[idx].clone())
            .collect();
        let sub_reads = read.shard(&cover);
        if sub_reads.len() != cover.len() {
            return Err(TesseraError::invariant(
                "shard produced wrong number of sub-reads",
            ));
        }

        let responses = self.dispatch(&indices, sub_reads, |shard, sub| {
            shard.store.read(sub, order, interruptor)
        })?;
        read.unshard(responses, &self.cache)
    }

    /// Perform a write on the namespace.
    pub fn write(
        &self,
        write: P::Write,
        order: OrderToken,
        interruptor: &Interruptor,
    ) -> TesseraResult<P::WriteResponse> {
        let target = <P::Write as WriteQuery<P>>::region(&write);
        let indices = self.cover_for(&target)?;
        let cover: Vec<P::Region> = indices
            .iter()
            .map(|&idx| self.partition.regions()[idx].clone())
            .collect();
        let sub_writes = write.shard(&cover);
        if sub_writes.len() != cover.len() {
            return Err(TesseraError::invariant(
                "shard produced wrong number of sub-writes",
            ));
        }

        let responses = self.dispatch(&indices, sub_writes, |shard, sub| {
            // The write window serializes timestamp allocation against
            // commit, so transitions chain per store.
            let _window = shard.write_window.lock();
            let timestamp = TransitionTimestamp::starting_at(shard.store.timestamp());
            shard.store.write(sub, timestamp, order, interruptor)
        })?;
        write.unshard(responses, &self.cache)
    }

    /// Run `op` against the selected shards, in parallel when more than
    /// one shard is involved. Responses come back in cover order; the
    /// first error (in cover order) wins.
    fn dispatch<Q, R, F>(&self, indices: &[usize], subs: Vec<Q>, op: F) -> TesseraResult<Vec<R>>
    where
        Q: Send,
        R: Send,
        F: Fn(&NamespaceShard<P>, Q) -> TesseraResult<R> + Send + Sync,
    {
        if indices.len() <= 1 {
            let mut responses = Vec::with_capacity(indices.len());
            for (&idx, sub) in indices.iter().zip(subs) {
                responses.push(op(&self.shards[idx], sub)?);
            }
            return Ok(responses);
        }

        let mut slots: Vec<Option<TesseraResult<R>>> = Vec::new();
        slots.resize_with(indices.len(), || None);
        std::thread::scope(|scope| {
            for ((&idx, sub), slot) in indices.iter().zip(subs).zip(slots.iter_mut()) {
                let shard = &self.shards[idx];
                let op = &op;
                scope.spawn(move || {
                    *slot = Some(op(shard, sub));
                });
            }
        });

        let mut responses = Vec::with_capacity(slots.len());
        for slot in slots {
            let result =
                slot.ok_or_else(|| TesseraError::invariant("shard dispatch lost a response"))?;
            responses.push(result?);
        }
        Ok(responses)
    }
}
