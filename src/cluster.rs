//! Cluster membership seam.
//!
//! The engine never implements leader election itself; it consults an
//! injected oracle that answers one question: is this node currently
//! responsible for draining the queue? Leadership is re-checked at the top
//! of every cycle and again at every finalization, so a revoked lease stops
//! new work and refuses late status writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

/// Answers whether this node currently owns queue processing.
#[async_trait]
pub trait ClusterOracle: Send + Sync {
    async fn is_leader(&self) -> bool;
}

/// Oracle for single-node deployments: always in charge.
pub struct SoleOwner;

#[async_trait]
impl ClusterOracle for SoleOwner {
    async fn is_leader(&self) -> bool {
        true
    }
}

/// Flip-able oracle, for tests and operational fencing.
#[derive(Clone)]
pub struct ToggleOracle {
    leader: Arc<AtomicBool>,
}

impl ToggleOracle {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: Arc::new(AtomicBool::new(leader)),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterOracle for ToggleOracle {
    async fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_oracle_flips() {
        let oracle = ToggleOracle::new(true);
        assert!(oracle.is_leader().await);

        oracle.set_leader(false);
        assert!(!oracle.is_leader().await);

        let clone = oracle.clone();
        clone.set_leader(true);
        assert!(oracle.is_leader().await);
    }
}
