//! Cooperative cancellation.
//!
//! An [`Interruptor`] is a one-shot signal: it is pulsed at most once and
//! never resets. Every blocking operation in the core accepts one and
//! guarantees that, within a bounded window after the pulse, it either
//! returns normally or fails with [`TesseraError::Interrupted`]. No
//! operation is forcibly killed; cancellation is observed at declared
//! blocking points only.

use crate::core::error::{TesseraError, TesseraResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A one-shot cancellation signal, cheap to clone and share across threads.
///
/// Cloning produces a handle to the same underlying signal: pulsing any
/// clone pulses them all.
#[derive(Clone, Default)]
pub struct Interruptor {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pulsed: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Interruptor {
    /// Create a fresh, unpulsed signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulse the signal. Idempotent; the signal never resets.
    pub fn pulse(&self) {
        if !self.inner.pulsed.swap(true, Ordering::AcqRel) {
            let _guard = self.inner.lock.lock();
            self.inner.condvar.notify_all();
        }
    }

    /// Check whether the signal has been pulsed.
    pub fn is_pulsed(&self) -> bool {
        self.inner.pulsed.load(Ordering::Acquire)
    }

    /// Fail with [`TesseraError::Interrupted`] if the signal has been
    /// pulsed. Called at every blocking point.
    pub fn check(&self) -> TesseraResult<()> {
        if self.is_pulsed() {
            Err(TesseraError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for at most `timeout`, waking early if the signal is pulsed.
    ///
    /// Returns `true` if the signal was pulsed before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_pulsed() {
            return true;
        }
        let mut guard = self.inner.lock.lock();
        // Re-check under the lock so a pulse between the check above and
        // the wait below cannot be missed.
        if self.is_pulsed() {
            return true;
        }
        self.inner.condvar.wait_for(&mut guard, timeout);
        self.is_pulsed()
    }
}

impl std::fmt::Debug for Interruptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interruptor")
            .field("pulsed", &self.is_pulsed())
            .finish()
    }
}
