// src/sync.rs

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// User code never runs while an engine lock is held, so a poisoned lock can
/// only come from a panic inside the engine's own bookkeeping; the protected
/// data is still structurally valid at that point.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
