//! Operational snapshot of the engine, for introspection — not business
//! logic.

use serde::Serialize;

use super::stats::CategoryStatsSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// True between `start()` and `shutdown()` (and only with processing
    /// enabled).
    pub running: bool,
    /// Completed coordinator cycles since `start()`.
    pub cycle: u64,
    /// Pool tasks currently executing. The coordinator occupies one slot
    /// while the engine runs.
    pub active_workers: usize,
    /// Jobs waiting in the bounded task queue.
    pub queued_jobs: usize,
    pub queue_capacity: usize,
    /// Detached continuations still in flight.
    pub detached_in_flight: usize,
    /// Categories with a registered handler, in registration order.
    pub categories: Vec<String>,
    /// Keys blocked by admission control in the current cycle.
    pub blocked_keys: Vec<BlockedKey>,
    pub stats: Vec<CategoryStatsSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedKey {
    pub category: String,
    pub key: String,
}
