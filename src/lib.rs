//! Tessera - Sharded storage protocol core.
//!
//! Tessera is the contract layer of a distributed key-value database: the
//! algebra of regions (key sets), the shard/unshard decomposition of
//! queries, the deterministic write contract, the backfill protocol by
//! which replicas transfer state, and the stream operator set query
//! engines evaluate over range reads. The clustering layer above routes,
//! replicates, and reshards through these interfaces without knowing any
//! protocol's internals; storage engines below plug in by implementing
//! one trait bundle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Namespace Facade                          │
//! │        region cover │ shard │ parallel dispatch │ unshard       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Protocol Contract                          │
//! │   RegionLike │ ReadQuery/WriteQuery │ StoreOps │ TemporaryCache │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KV Protocol                              │
//! │    KeyRange regions │ Datum values │ MemoryStore │ Backfill     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Stream Operators                          │
//! │   map/filter/concat_map pushdown │ slice/zip/union │ terminals  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::error`] - Error taxonomy and result alias
//! - [`core::interrupt`] - One-shot cooperative cancellation
//! - [`core::timestamp`] - State and transition timestamps
//! - [`core::order`] - Order tokens and per-origin issue order
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::wire`] - Binary encoding for boundary values
//!
//! ## Protocol Contract
//! - [`protocol::region`] - The region algebra
//! - [`protocol::query`] - Shard/unshard query algebra and the bundle
//! - [`protocol::cache`] - Temporary cache for unshard scratch
//! - [`protocol::store`] - Store state machine and operations
//! - [`protocol::backfill`] - Generic backfill exchange driver
//! - [`protocol::rebalance`] - Rebalance precondition validation
//!
//! ## KV Protocol
//! - [`kv::region`] - Key-range regions
//! - [`kv::datum`] - Dynamic document values
//! - [`kv::query`] - Point/range reads, single-key and batch writes
//! - [`kv::store`] - In-memory reference store with persistence
//! - [`kv::backfill`] - Backfill requests and delta chunks
//! - [`kv::rebalance`] - Store repartitioning
//!
//! ## Streams
//! - [`stream::func`] - Serializable pushdown functions
//! - [`stream::transform`] - Transformations, terminals, merging
//! - [`stream::eager`] - In-memory sources and wrapper operators
//! - [`stream::lazy`] - Remote range-read streams
//!
//! ## Namespace
//! - [`namespace::routing`] - Disjoint partition tables
//! - [`namespace::facade`] - The read/write entry point
//!
//! # Key Invariants
//!
//! - Sharded execution is invisible: `unshard(exec(shard(q)))` equals
//!   executing `q` against one store covering its whole region.
//! - Writes are deterministic: identical states fed identical
//!   (write, timestamp) sequences stay byte-identical.
//! - Timestamps chain: each write moves a store from `t.before` to
//!   `t.after`, and successive writes connect.
//! - A store is never coherent while backfilling, and both flags are
//!   durable; a crash mid-backfill recovers stale, never torn.
//! - Every blocking operation answers an interruptor pulse within a
//!   bounded window, leaving no intermediate state.

// Core infrastructure
pub mod core;

// Protocol contract
pub mod protocol;

// KV protocol binding
pub mod kv;

// Stream operator set
pub mod stream;

// Namespace facade
pub mod namespace;

// Re-exports for convenience
pub use crate::core::config::CoreConfig;
pub use crate::core::error::{TesseraError, TesseraResult};
pub use crate::core::interrupt::Interruptor;
pub use crate::core::order::{OrderSource, OrderToken};
pub use crate::core::timestamp::{StateTimestamp, TransitionTimestamp};
pub use kv::datum::Datum;
pub use kv::query::KvProtocol;
pub use kv::region::KeyRange;
pub use kv::store::MemoryStore;
pub use namespace::facade::Namespace;
pub use protocol::backfill::run_backfill;
pub use protocol::cache::TemporaryCache;
pub use protocol::query::Protocol;
pub use protocol::store::{StoreOps, StoreStatus};
pub use stream::Stream;
