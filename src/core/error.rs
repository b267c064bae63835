//! Error types shared by every layer of the protocol core.
//!
//! The taxonomy is deliberately small. Everything a store, backfill
//! exchange, or stream operator can surface falls into one of four kinds,
//! and the kind determines how callers react:
//!
//! - [`TesseraError::Interrupted`] - the interruptor was pulsed; the
//!   operation terminated cooperatively and left no torn state.
//! - [`TesseraError::UserQuery`] - the query itself is at fault (empty
//!   reduce without a base, `zip` on a non-join, type mismatch); surfaced
//!   to the client unchanged.
//! - [`TesseraError::Invariant`] - an internal precondition was violated;
//!   this is a bug in the caller, not a recoverable condition.
//! - [`TesseraError::Transient`] - a peer or resource was unavailable; the
//!   routing layer may retry, possibly against a different replica.

use thiserror::Error;

/// Error conditions of the protocol core.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// The interrupt signal was pulsed while the operation was in flight.
    ///
    /// A write that fails with this error has either committed fully or not
    /// at all; it is never left in an intermediate state.
    #[error("interrupted")]
    Interrupted,

    /// A query-level error, surfaced to the client as-is.
    #[error("{message}")]
    UserQuery { message: String },

    /// An internal contract violation. Indicates a bug in the caller.
    #[error("invariant violated: {message}")]
    Invariant { message: String },

    /// A recoverable failure: remote peer unavailable, backfill aborted by
    /// the source, persistence I/O failure.
    #[error("transient failure: {message}")]
    Transient { message: String },
}

impl TesseraError {
    /// Create a query-level error.
    pub fn user_query(message: impl Into<String>) -> Self {
        Self::UserQuery {
            message: message.into(),
        }
    }

    /// Create an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Check if this error indicates the operation should be retried,
    /// possibly against a different replica.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check if this error is an interruption.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Check if this error should be shown to the client as a query error.
    pub fn is_user_query(&self) -> bool {
        matches!(self, Self::UserQuery { .. })
    }
}

/// Result type using TesseraError.
pub type TesseraResult<T> = Result<T, TesseraError>;
