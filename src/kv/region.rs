//! Key-range regions.
//!
//! The KV protocol's region lattice is half-open byte ranges
//! `[start, end)`, with an optional unbounded right edge. Ranges are kept
//! in canonical form (every empty range normalizes to the same value)
//! so structural equality coincides with key-set equality and the
//! serialized form is stable.

use crate::protocol::region::RegionLike;
use serde::{Deserialize, Serialize};

/// A half-open range of keys `[start, end)`; `end == None` means
/// unbounded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    start: Vec<u8>,
    end: Option<Vec<u8>>,
}

impl KeyRange {
    /// The range `[start, end)`. Ranges with `end <= start` normalize to
    /// the canonical empty range.
    pub fn new(start: impl Into<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        let start = start.into();
        match end {
            Some(e) if e <= start => Self::empty_range(),
            end => Self { start, end },
        }
    }

    /// The range of all keys.
    pub fn universe() -> Self {
        Self {
            start: Vec::new(),
            end: None,
        }
    }

    /// The range containing exactly `key`.
    pub fn point(key: &[u8]) -> Self {
        Self {
            start: key.to_vec(),
            end: Some(key_successor(key)),
        }
    }

    /// The range `[start, ∞)`.
    pub fn from_key(start: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: None,
        }
    }

    /// The smallest range containing every key in `keys`. Empty input
    /// yields the empty range.
    pub fn hull_of_keys<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut bounds: Option<(&[u8], &[u8])> = None;
        for key in keys {
            bounds = Some(match bounds {
                None => (key, key),
                Some((lo, hi)) => (lo.min(key), hi.max(key)),
            });
        }
        match bounds {
            None => Self::empty_range(),
            Some((lo, hi)) => Self {
                start: lo.to_vec(),
                end: Some(key_successor(hi)),
            },
        }
    }

    fn empty_range() -> Self {
        Self {
            start: Vec::new(),
            end: Some(Vec::new()),
        }
    }

    /// The inclusive left edge.
    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// The exclusive right edge, if bounded.
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// Check whether `key` falls inside this range.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        if self.is_empty() {
            return false;
        }
        key >= self.start.as_slice() && self.end.as_deref().map_or(true, |e| key < e)
    }
}

/// The smallest key strictly greater than `key`.
pub fn key_successor(key: &[u8]) -> Vec<u8> {
    let mut succ = key.to_vec();
    succ.push(0);
    succ
}

impl RegionLike for KeyRange {
    fn empty() -> Self {
        Self::empty_range()
    }

    fn is_empty(&self) -> bool {
        self.end.as_deref().is_some_and(|e| e <= self.start.as_slice())
    }

    fn contains(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        if other.start < self.start {
            return false;
        }
        match (&self.end, &other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(se), Some(oe)) => oe <= se,
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    fn intersection(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::empty_range();
        }
        let start = self.start.clone().max(other.start.clone());
        let end = match (&self.end, &other.end) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e.clone()),
            (Some(a), Some(b)) => Some(a.clone().min(b.clone())),
        };
        Self::new(start, end)
    }

    fn covered_by(&self, cover: &[Self]) -> bool {
        if self.is_empty() {
            return true;
        }
        // Sweep left to right over the pieces of the cover that fall
        // inside this range; any gap before the right edge is a miss.
        let mut pieces: Vec<KeyRange> = cover
            .iter()
            .map(|r| self.intersection(r))
            .filter(|r| !r.is_empty())
            .collect();
        pieces.sort();

        let mut cursor = self.start.clone();
        for piece in pieces {
            if piece.start.as_slice() > cursor.as_slice() {
                return false;
            }
            match piece.end {
                None => return true,
                Some(e) => {
                    if e > cursor {
                        cursor = e;
                    }
                }
            }
        }
        match &self.end {
            None => false,
            Some(e) => cursor.as_slice() >= e.as_slice(),
        }
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "[empty)");
        }
        match &self.end {
            None => write!(
                f,
                "[{}..)",
                String::from_utf8_lossy(&self.start)
            ),
            Some(e) => write!(
                f,
                "[{}..{})",
                String::from_utf8_lossy(&self.start),
                String::from_utf8_lossy(e)
            ),
        }
    }
}
