//! Pluggable mutual exclusion around state vector element access, mirroring
//! the original platform abstraction layer's lock seam so that a runtime
//! embedded alongside a real-time scheduler can swap in its own primitive.

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard};

/// Anything that can guard a critical section. `acquire` returns a guard
/// whose drop releases the lock — callers never call `release` directly.
pub trait Lock {
    fn acquire(&self) -> Box<dyn Drop + '_>;
}

/// A `std::sync::Mutex`-backed lock for state vectors shared across threads.
pub struct MutexLock(Mutex<()>);

impl MutexLock {
    pub fn new() -> Self {
        Self(Mutex::new(()))
    }
}

impl Default for MutexLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for MutexLock {
    fn acquire(&self) -> Box<dyn Drop + '_> {
        let guard: MutexGuard<'_, ()> = self.0.lock().unwrap_or_else(|e| e.into_inner());
        Box::new(guard)
    }
}

/// A single-threaded no-op lock that still detects reentrancy, for tests and
/// single-task embedded targets where a real mutex is unnecessary overhead.
pub struct NullLock(Cell<bool>);

impl NullLock {
    pub fn new() -> Self {
        Self(Cell::new(false))
    }
}

impl Default for NullLock {
    fn default() -> Self {
        Self::new()
    }
}

struct NullGuard<'a>(&'a Cell<bool>);

impl<'a> Drop for NullGuard<'a> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Lock for NullLock {
    fn acquire(&self) -> Box<dyn Drop + '_> {
        assert!(!self.0.get(), "NullLock does not support reentrant access");
        self.0.set(true);
        Box::new(NullGuard(&self.0))
    }
}
