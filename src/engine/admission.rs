//! Per-key admission control.
//!
//! Tracks which (category, key) pairs already have in-flight work within
//! the current processing cycle, so two records targeting the same logical
//! entity are never dispatched concurrently. This is a coarse, node-local
//! mechanism, not a distributed lock: the cluster oracle keeps every other
//! node from scheduling anything at all while this node is the owner.
//!
//! The blocked set is cleared unconditionally at the end of every cycle and
//! never persisted, which bounds its size and guarantees skipped records
//! are retried.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct AdmissionControl {
    blocked: Mutex<HashSet<(String, String)>>,
}

impl AdmissionControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(String, String)>> {
        self.blocked.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True unless this (category, key) was blocked earlier in the cycle.
    pub fn is_admitted(&self, category: &str, key: &str) -> bool {
        !self
            .lock()
            .contains(&(category.to_string(), key.to_string()))
    }

    /// Block a key for the remainder of the cycle.
    pub fn block(&self, category: &str, key: &str) {
        self.lock().insert((category.to_string(), key.to_string()));
    }

    /// End-of-cycle reset.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Sorted snapshot for the status surface.
    pub fn blocked_keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = self.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
