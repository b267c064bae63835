//! Per-operation scratch shared across unshard calls.
//!
//! A [`TemporaryCache`] is handed to every `unshard` call. It may be
//! fresh, reused across many calls, or shared by concurrent calls on
//! different threads - `unshard` must return the same value in every
//! case. The intended use is expensive reusable context: protocols that
//! evaluate embedded functions during response recombination park their
//! compiled forms here instead of rebuilding them per call.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A concurrency-safe, type-keyed scratch map.
///
/// Each distinct type gets one slot, created on first use. Slots are
/// shared: callers receive an `Arc` to the slot value and synchronize
/// any interior state themselves.
#[derive(Default)]
pub struct TemporaryCache {
    slots: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TemporaryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot for type `T`, creating it with `init` if absent.
    pub fn get_or_init<T, F>(&self, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let key = TypeId::of::<T>();
        if let Some(slot) = self.slots.read().get(&key) {
            if let Ok(typed) = Arc::clone(slot).downcast::<T>() {
                return typed;
            }
        }
        let mut slots = self.slots.write();
        let slot = slots
            .entry(key)
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>);
        Arc::clone(slot)
            .downcast::<T>()
            .unwrap_or_else(|_| unreachable!("slot keyed by TypeId holds its own type"))
    }

    /// Number of distinct slot types currently held.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Check whether the cache holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl std::fmt::Debug for TemporaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCache")
            .field("slots", &self.len())
            .finish()
    }
}
