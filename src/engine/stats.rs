//! Rolling per-category throughput counters.
//!
//! Every finalization reports its duration; every `STATS_WINDOW`
//! completions of a category an info line summarizes the window and the
//! cumulative numbers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

pub(crate) const STATS_WINDOW: u64 = 100;

#[derive(Default)]
pub struct StatsBook {
    inner: Mutex<HashMap<String, CategoryStats>>,
}

#[derive(Default, Clone)]
struct CategoryStats {
    total_count: u64,
    total_ms: u64,
    window_count: u64,
    window_ms: u64,
}

/// Point-in-time view of one category's counters.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStatsSnapshot {
    pub category: String,
    pub completed: u64,
    pub avg_ms: u64,
}

impl StatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CategoryStats>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, category: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let mut book = self.lock();
        let stats = book.entry(category.to_string()).or_default();
        stats.total_count += 1;
        stats.total_ms += elapsed_ms;
        stats.window_count += 1;
        stats.window_ms += elapsed_ms;

        if stats.window_count == STATS_WINDOW {
            info!(
                category,
                window = STATS_WINDOW,
                window_avg_ms = stats.window_ms / stats.window_count,
                total = stats.total_count,
                total_avg_ms = stats.total_ms / stats.total_count,
                "import throughput"
            );
            stats.window_count = 0;
            stats.window_ms = 0;
        }
    }

    pub fn snapshot(&self) -> Vec<CategoryStatsSnapshot> {
        let book = self.lock();
        let mut entries: Vec<CategoryStatsSnapshot> = book
            .iter()
            .map(|(category, stats)| CategoryStatsSnapshot {
                category: category.clone(),
                completed: stats.total_count,
                avg_ms: if stats.total_count > 0 {
                    stats.total_ms / stats.total_count
                } else {
                    0
                },
            })
            .collect();
        entries.sort_by(|a, b| a.category.cmp(&b.category));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_aggregates_per_category() {
        let stats = StatsBook::new();
        stats.record("orders", Duration::from_millis(100));
        stats.record("orders", Duration::from_millis(300));
        stats.record("bins", Duration::from_millis(50));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].category, "bins");
        assert_eq!(snapshot[1].category, "orders");
        assert_eq!(snapshot[1].completed, 2);
        assert_eq!(snapshot[1].avg_ms, 200);
    }

    #[test]
    fn window_counters_reset_at_the_window_boundary() {
        let stats = StatsBook::new();
        for _ in 0..STATS_WINDOW {
            stats.record("orders", Duration::from_millis(10));
        }
        let book = stats.lock();
        let orders = book.get("orders").unwrap();
        assert_eq!(orders.window_count, 0);
        assert_eq!(orders.total_count, STATS_WINDOW);
    }
}
