//! In-memory lock manager.
//!
//! The persisted `Action::lock` flag is advisory only (surfaced to the UI/API
//! for introspection); correctness comes from this in-process map, since a
//! read-modify-write against the store is not atomic under its single-key
//! transactions. Backed by a single mutex rather than a sharded map: lock
//! hold times are microseconds (a flag flip), so contention is not a concern.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct LockManager {
    held: Mutex<HashSet<(String, String)>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the lock for `(group, action)`. Returns `false`
    /// without blocking if another dispatch already holds it.
    pub fn try_acquire(&self, group: &str, action: &str) -> bool {
        let mut held = self.held.lock().expect("lock manager mutex poisoned");
        held.insert((group.to_string(), action.to_string()))
    }

    /// Release the lock unconditionally. Releasing an unheld lock is a no-op.
    pub fn release(&self, group: &str, action: &str) {
        let mut held = self.held.lock().expect("lock manager mutex poisoned");
        held.remove(&(group.to_string(), action.to_string()));
    }

    pub fn is_locked(&self, group: &str, action: &str) -> bool {
        let held = self.held.lock().expect("lock manager mutex poisoned");
        held.contains(&(group.to_string(), action.to_string()))
    }
}
