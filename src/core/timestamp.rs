//! Logical timestamps for store write histories.
//!
//! Each store carries a monotonic logical clock. Two refinements exist:
//!
//! - [`StateTimestamp`] names the state after some number of writes.
//! - [`TransitionTimestamp`] names the `(before, after)` pair of exactly
//!   one write.
//!
//! For every applied write the store's timestamp moves from `before` to
//! `after`, and successive writes chain: the second write's `before`
//! equals the first write's `after`.

use serde::{Deserialize, Serialize};

/// A point in a store's write history.
///
/// Replicas of the same region share a write history and therefore agree
/// on the meaning of each timestamp value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StateTimestamp {
    count: u64,
}

impl StateTimestamp {
    /// The timestamp of a store that has applied no writes.
    pub const fn zero() -> Self {
        Self { count: 0 }
    }

    /// Construct from a raw write count.
    pub const fn from_count(count: u64) -> Self {
        Self { count }
    }

    /// The raw write count.
    pub const fn count(self) -> u64 {
        self.count
    }

    /// The timestamp after one more write.
    pub const fn next(self) -> Self {
        Self {
            count: self.count + 1,
        }
    }
}

impl std::fmt::Display for StateTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ts({})", self.count)
    }
}

/// The `(before, after)` pair of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionTimestamp {
    before: StateTimestamp,
    after: StateTimestamp,
}

impl TransitionTimestamp {
    /// The transition of the next write applied to a store currently at
    /// `before`.
    pub const fn starting_at(before: StateTimestamp) -> Self {
        Self {
            before,
            after: before.next(),
        }
    }

    /// The store timestamp this write expects to find.
    pub const fn before(self) -> StateTimestamp {
        self.before
    }

    /// The store timestamp after this write commits.
    pub const fn after(self) -> StateTimestamp {
        self.after
    }

    /// Check that `next` chains onto this transition.
    pub const fn chains_to(self, next: TransitionTimestamp) -> bool {
        self.after.count == next.before.count
    }
}

impl std::fmt::Display for TransitionTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ts({}->{})", self.before.count, self.after.count)
    }
}
