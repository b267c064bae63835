//! Order tokens.
//!
//! An order token ties an operation to its origin (a client connection or
//! thread) so that stores can honour the "same origin, same order" rule:
//! operations carrying tokens from one origin are applied in issue order.
//! Tokens from different origins impose no ordering on each other.

use crate::core::error::{TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved origin id meaning "no ordering requirement".
const UNORDERED_ORIGIN: u64 = 0;

/// An operation's position in its origin's issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderToken {
    origin: u64,
    seq: u64,
}

impl OrderToken {
    /// A token that imposes no ordering. Used for operations whose caller
    /// does not participate in any issue-order chain (e.g. internal
    /// stream batch fetches).
    pub const fn unordered() -> Self {
        Self {
            origin: UNORDERED_ORIGIN,
            seq: 0,
        }
    }

    /// Check whether this token carries an ordering requirement.
    pub const fn is_ordered(&self) -> bool {
        self.origin != UNORDERED_ORIGIN
    }

    /// The origin this token belongs to.
    pub const fn origin(&self) -> u64 {
        self.origin
    }

    /// The issue sequence number within the origin.
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// Issues order tokens for a single origin in strictly increasing
/// sequence.
#[derive(Debug)]
pub struct OrderSource {
    origin: u64,
    next_seq: AtomicU64,
}

impl OrderSource {
    /// Create a source for the given origin id. Origin `0` is reserved
    /// for [`OrderToken::unordered`].
    pub fn new(origin: u64) -> TesseraResult<Self> {
        if origin == UNORDERED_ORIGIN {
            return Err(TesseraError::invariant(
                "origin 0 is reserved for unordered tokens",
            ));
        }
        Ok(Self {
            origin,
            next_seq: AtomicU64::new(1),
        })
    }

    /// Issue the next token for this origin.
    pub fn token(&self) -> OrderToken {
        OrderToken {
            origin: self.origin,
            seq: self.next_seq.fetch_add(1, Ordering::AcqRel),
        }
    }
}

/// Per-store bookkeeping that enforces issue order within each origin.
///
/// A token whose sequence does not advance its origin's last observed
/// sequence indicates a reordered or replayed operation, which is a
/// contract violation by the dispatch layer.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    last_seq: HashMap<u64, u64>,
}

impl OrderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token` as observed, failing if it regresses within its
    /// origin.
    pub fn checkpoint(&mut self, token: OrderToken) -> TesseraResult<()> {
        if !token.is_ordered() {
            return Ok(());
        }
        let last = self.last_seq.entry(token.origin).or_insert(0);
        if token.seq <= *last {
            return Err(TesseraError::invariant(format!(
                "order token regression for origin {}: seq {} after {}",
                token.origin, token.seq, last
            )));
        }
        *last = token.seq;
        Ok(())
    }
}
