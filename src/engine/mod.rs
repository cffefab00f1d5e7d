//! The import-entry processing engine.
//!
//! - **manager**: lifecycle facade and the producer API
//! - **coordinator**: the self-scheduling polling loop
//! - **pool**: bounded worker pool + detached-work tracking
//! - **admission**: per-key duplicate suppression within a cycle
//! - **stats** / **status**: throughput counters and the ops snapshot

pub mod admission;
mod coordinator;
pub mod manager;
pub mod pool;
pub mod stats;
pub mod status;

pub use admission::AdmissionControl;
pub use manager::{CreateResult, Manager};
pub use pool::{DetachedTracker, PoolHandle, Saturated, WorkerPool};
pub use stats::{CategoryStatsSnapshot, StatsBook};
pub use status::EngineStatus;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tokio::sync::Notify;

use crate::cluster::ClusterOracle;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::handler::HandlerRegistry;
use crate::model::WorkRecord;
use crate::store::WorkStore;

/// State shared between the manager, the coordinator, and worker jobs.
pub(crate) struct EngineShared {
    pub store: Arc<dyn WorkStore>,
    pub oracle: Arc<dyn ClusterOracle>,
    pub registry: Arc<HandlerRegistry>,
    pub admission: AdmissionControl,
    pub stats: StatsBook,
    pub detached: DetachedTracker,
    pub wakeup: Notify,
    pub cycle: AtomicU64,
    pub config: EngineConfig,
}

impl EngineShared {
    /// Finalize a record as processed. Leadership is re-checked here: a
    /// node the oracle no longer recognizes must not write status, so the
    /// attempt fails loudly instead.
    pub(crate) async fn finalize_success(
        &self,
        record: &WorkRecord,
        response: Option<String>,
        elapsed: Duration,
    ) -> Result<()> {
        self.ensure_leader(record).await?;
        self.store.mark_processed(&record.id, response).await?;
        self.stats.record(&record.category, elapsed);
        Ok(())
    }

    /// Finalize a record as failed, through the store's independent error
    /// write. Same leadership gate as the success path.
    pub(crate) async fn finalize_error(
        &self,
        record: &WorkRecord,
        error_text: &str,
        elapsed: Option<Duration>,
    ) -> Result<()> {
        self.ensure_leader(record).await?;
        self.store.mark_error(&record.id, error_text, None).await?;
        if let Some(elapsed) = elapsed {
            self.stats.record(&record.category, elapsed);
        }
        Ok(())
    }

    async fn ensure_leader(&self, record: &WorkRecord) -> Result<()> {
        if self.oracle.is_leader().await {
            Ok(())
        } else {
            Err(Error::NotLeader(format!(
                "refusing to finalize record {}",
                record.id
            )))
        }
    }
}
