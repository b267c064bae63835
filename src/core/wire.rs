//! Wire encoding for boundary values.
//!
//! Every value that crosses a store or namespace boundary - regions,
//! queries, responses, backfill requests and chunks, timestamps - has a
//! stable binary encoding with the round-trip law
//! `decode(encode(x)) == x`. The encoding is deterministic, so byte
//! equality of encodings implies structural equality of values and the
//! frames can be hashed for fingerprinting.

use crate::core::error::{TesseraError, TesseraResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a boundary value into a binary frame.
pub fn encode<T: Serialize>(value: &T) -> TesseraResult<Bytes> {
    let raw = bincode::serialize(value)
        .map_err(|e| TesseraError::invariant(format!("unencodable boundary value: {}", e)))?;
    Ok(Bytes::from(raw))
}

/// Decode a boundary value from a binary frame.
///
/// Decode failures are transient: the peer that produced the frame may be
/// running a different build, and the routing layer can retry elsewhere.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> TesseraResult<T> {
    bincode::deserialize(frame)
        .map_err(|e| TesseraError::transient(format!("undecodable frame: {}", e)))
}
