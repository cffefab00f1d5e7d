//! Manager: lifecycle facade and the producer API.
//!
//! One explicitly constructed, dependency-injected instance per process.
//! Owns startup/shutdown of the coordinator and the worker pool; producers
//! only ever talk to this type.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, error, info};

use super::coordinator::Coordinator;
use super::pool::{DetachedTracker, PoolHandle, WorkerPool};
use super::status::{BlockedKey, EngineStatus};
use super::{AdmissionControl, EngineShared, StatsBook};
use crate::cluster::ClusterOracle;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::model::{NewWorkRecord, RecordId, WorkRecord};
use crate::store::WorkStore;

/// What happened when work was created.
#[derive(Debug)]
pub enum CreateResult {
    /// New record persisted as pending.
    Created(Box<WorkRecord>),
    /// A record with this id already exists; creation was silently skipped
    /// (the idempotent-producer contract).
    Duplicate(RecordId),
}

enum RunState {
    Idle,
    Running,
    Stopped,
}

struct Lifecycle {
    state: RunState,
    pool: Option<WorkerPool>,
    pool_handle: Option<PoolHandle>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

pub struct Manager {
    shared: Arc<EngineShared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Manager {
    pub fn new(
        store: Arc<dyn WorkStore>,
        oracle: Arc<dyn ClusterOracle>,
        registry: Arc<HandlerRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                oracle,
                registry,
                admission: AdmissionControl::new(),
                stats: StatsBook::new(),
                detached: DetachedTracker::new(),
                wakeup: Notify::new(),
                cycle: AtomicU64::new(0),
                config,
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: RunState::Idle,
                pool: None,
                pool_handle: None,
                shutdown_tx: None,
            }),
        }
    }

    /// Start the engine. Idempotent; a silent no-op when already running or
    /// when import processing is administratively disabled.
    pub fn start(&self) {
        if !self.shared.config.enabled {
            debug!("import processing disabled, start is a no-op");
            return;
        }
        let mut lifecycle = self.lock();
        if matches!(lifecycle.state, RunState::Running) {
            debug!("engine already started");
            return;
        }

        let pool = WorkerPool::start(
            self.shared.config.worker_count,
            self.shared.config.queue_capacity,
        );
        let handle = pool.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = Coordinator::new(Arc::clone(&self.shared), handle.clone(), shutdown_rx);

        // The coordinator runs as the pool's first, perpetual job: it
        // occupies one worker slot for the life of the engine.
        if handle.try_submit(Box::pin(coordinator.run())).is_err() {
            error!("failed to seat the coordinator in the worker pool");
            return;
        }

        lifecycle.pool_handle = Some(handle);
        lifecycle.pool = Some(pool);
        lifecycle.shutdown_tx = Some(shutdown_tx);
        lifecycle.state = RunState::Running;
        info!(
            workers = self.shared.config.worker_count,
            queue_capacity = self.shared.config.queue_capacity,
            "import engine started"
        );
    }

    /// Stop the engine. Idempotent. In-flight pool tasks are hard-cancelled;
    /// detached continuations keep running and finalize on their own if the
    /// process stays alive — use [`Manager::wait_detached`] to drain them.
    /// `create_work` keeps persisting records after shutdown; they are
    /// picked up after the next `start()`.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lock();
        if !matches!(lifecycle.state, RunState::Running) {
            debug!("engine not running, shutdown is a no-op");
            return;
        }

        if let Some(tx) = lifecycle.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(mut pool) = lifecycle.pool.take() {
            pool.abort();
        }
        lifecycle.pool_handle = None;
        lifecycle.state = RunState::Stopped;

        let detached = self.shared.detached.in_flight();
        if detached > 0 {
            info!(detached, "import engine stopped, detached continuations left running");
        } else {
            info!("import engine stopped");
        }
    }

    /// Persist a new work record. A duplicate id is silently ignored and
    /// reported as [`CreateResult::Duplicate`]. Unless the builder asked
    /// for `quiet`, the coordinator is woken immediately.
    pub async fn create_work(&self, new: NewWorkRecord) -> Result<CreateResult> {
        let quiet = new.quiet;
        let record = new.into_record();

        if !self.shared.store.insert(&record).await? {
            debug!(record_id = %record.id, "record already exists, ignoring");
            return Ok(CreateResult::Duplicate(record.id));
        }
        info!(record_id = %record.id, category = %record.category, "work record created");

        if !quiet {
            self.notify();
        }
        Ok(CreateResult::Created(Box::new(record)))
    }

    /// Wake the coordinator immediately instead of waiting for its poll
    /// timeout. Lazily starts the engine on first use; an explicitly
    /// stopped engine stays stopped until `start()` is called again.
    pub fn notify(&self) {
        let idle = matches!(self.lock().state, RunState::Idle);
        if idle {
            self.start();
        }
        self.shared.wakeup.notify_one();
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().state, RunState::Running)
    }

    /// True when explicitly shut down, or when the oracle says this node is
    /// not currently responsible for the queue.
    pub async fn is_shut_down(&self) -> bool {
        let stopped = matches!(self.lock().state, RunState::Stopped);
        stopped || !self.shared.oracle.is_leader().await
    }

    /// Wait for detached continuations to finish. Returns false on timeout.
    pub async fn wait_detached(&self, timeout: Duration) -> bool {
        self.shared.detached.wait_idle(timeout).await
    }

    /// Feed the rolling per-category counters. The engine reports every
    /// finalization itself; handlers may add their own timings.
    pub fn report_stats(&self, category: &str, elapsed: Duration) {
        self.shared.stats.record(category, elapsed);
    }

    /// Operational snapshot for introspection.
    pub fn status(&self) -> EngineStatus {
        let lifecycle = self.lock();
        let (active, queued, capacity) = match &lifecycle.pool_handle {
            Some(handle) => (handle.active(), handle.queued(), handle.capacity()),
            None => (0, 0, 0),
        };
        EngineStatus {
            running: matches!(lifecycle.state, RunState::Running),
            cycle: self.shared.cycle.load(Ordering::SeqCst),
            active_workers: active,
            queued_jobs: queued,
            queue_capacity: capacity,
            detached_in_flight: self.shared.detached.in_flight(),
            categories: self.shared.registry.categories().to_vec(),
            blocked_keys: self
                .shared
                .admission
                .blocked_keys()
                .into_iter()
                .map(|(category, key)| BlockedKey { category, key })
                .collect(),
            stats: self.shared.stats.snapshot(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}
