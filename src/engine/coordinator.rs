//! The coordinator: the scheduling heart of the engine.
//!
//! One perpetual task that wakes on notification or timeout, checks
//! leadership and pool headroom, drains bounded per-category batches of
//! pending records into the worker pool, and adapts its pause to observed
//! throughput. A single misbehaving record or handler never aborts a
//! cycle; a cycle failing wholesale (store down) triggers a long fixed
//! backoff, never loop exit.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, warn};

use super::EngineShared;
use super::pool::{Job, PoolHandle, Saturated};
use crate::error::{Error, Result};
use crate::handler::{Execution, Handler};
use crate::model::WorkRecord;
use crate::telemetry::{record_status_transition, start_record_span};

pub(crate) struct Coordinator {
    shared: Arc<EngineShared>,
    pool: PoolHandle,
    shutdown: watch::Receiver<bool>,
}

#[derive(Default)]
struct CycleOutcome {
    dispatched: usize,
    skipped: usize,
}

impl Coordinator {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        pool: PoolHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            shared,
            pool,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let startup_delay = self.shared.config.startup_delay();
        if !startup_delay.is_zero() {
            tokio::select! {
                _ = self.shutdown.changed() => {}
                _ = tokio::time::sleep(startup_delay) => {}
            }
        }
        info!("coordinator started");

        let mut drain_again = false;
        loop {
            if !drain_again {
                tokio::select! {
                    _ = self.shutdown.changed() => {}
                    _ = self.shared.wakeup.notified() => {}
                    _ = tokio::time::sleep(self.shared.config.poll_interval()) => {}
                }
            }
            if *self.shutdown.borrow() {
                break;
            }
            drain_again = false;

            let outcome = self.cycle().await;
            // The blocked-key set is a per-cycle artifact; reset it no
            // matter how the cycle ended.
            self.shared.admission.clear();

            match outcome {
                Ok(outcome) if outcome.dispatched > 0 => {
                    let pause = self.pause_after(outcome.dispatched);
                    debug!(
                        dispatched = outcome.dispatched,
                        skipped = outcome.skipped,
                        pause_ms = pause.as_millis() as u64,
                        "cycle dispatched work, pausing before redrain"
                    );
                    tokio::select! {
                        _ = self.shutdown.changed() => {}
                        _ = tokio::time::sleep(pause) => {}
                    }
                    drain_again = true;
                }
                Ok(outcome) => {
                    if outcome.skipped > 0 {
                        debug!(skipped = outcome.skipped, "cycle dispatched nothing, back to sleep");
                    }
                }
                Err(e) => {
                    error!(error = %e, "processing cycle failed");
                    tokio::select! {
                        _ = self.shutdown.changed() => {}
                        _ = tokio::time::sleep(self.shared.config.failure_backoff()) => {}
                    }
                }
            }
        }
        info!("coordinator stopped");
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        let cycle_no = self.shared.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let mut outcome = CycleOutcome::default();

        // Backpressure and single-writer gates, checked before touching
        // the store at all.
        if self.pool.is_saturated() {
            debug!(queued = self.pool.queued(), "task queue near capacity, skipping cycle");
            return Ok(outcome);
        }
        if !self.shared.oracle.is_leader().await {
            debug!("not the queue owner, skipping cycle");
            return Ok(outcome);
        }

        let mut categories = self.shared.store.pending_categories().await?;
        if categories.is_empty() {
            return Ok(outcome);
        }
        // The store returns categories in a fixed (sorted) order; rotating
        // the start by cycle number keeps a deep backlog in one category
        // from always consuming the pool's headroom first.
        let start = (cycle_no as usize) % categories.len();
        categories.rotate_left(start);

        for category in &categories {
            let Some(handler) = self.shared.registry.get(category) else {
                // A missing handler is a deployment issue, not a data
                // issue: records stay pending until one is registered.
                warn!(category = %category, "no handler registered, records stay pending");
                continue;
            };

            let batch = self
                .shared
                .store
                .pending_batch(category, self.shared.config.batch_size)
                .await?;
            debug!(category = %category, records = batch.len(), "draining category");

            for record in batch {
                if !self
                    .dispatch_one(category, record, &handler, &mut outcome)
                    .await?
                {
                    return Ok(outcome);
                }
            }
        }

        Ok(outcome)
    }

    /// Dispatch a single record. Returns Ok(false) when leadership was lost
    /// mid-drain and the cycle should stop quietly.
    async fn dispatch_one(
        &self,
        category: &str,
        record: WorkRecord,
        handler: &Arc<dyn Handler>,
        outcome: &mut CycleOutcome,
    ) -> Result<bool> {
        let key = match handler.dedup_key(&record) {
            Ok(key) => key,
            Err(e) => {
                // A broken key derivation is that record's problem, not
                // the cycle's: record the failure and move on.
                warn!(record_id = %record.id, error = %e, "dedup key derivation failed, recording error");
                match self.shared.finalize_error(&record, &e.to_string(), None).await {
                    Ok(()) => {}
                    Err(Error::NotLeader(msg)) => {
                        error!(%msg, "leadership lost mid-cycle, stopping drain");
                        return Ok(false);
                    }
                    Err(e) => return Err(e),
                }
                return Ok(true);
            }
        };

        if let Some(ref key) = key {
            if !self.shared.admission.is_admitted(category, key) {
                outcome.skipped += 1;
                debug!(record_id = %record.id, category = %category, key = %key, "key already in flight, deferring");
                return Ok(true);
            }
        }

        let job = dispatch_job(
            Arc::clone(&self.shared),
            Arc::clone(handler),
            record.clone(),
        );
        match self.pool.try_submit(job) {
            Ok(()) => {
                outcome.dispatched += 1;
                if let Some(key) = key {
                    self.shared.admission.block(category, &key);
                }
            }
            Err(Saturated) => {
                outcome.skipped += 1;
                debug!(record_id = %record.id, "task queue full, deferring");
            }
        }
        Ok(true)
    }

    /// Throughput-scaled pause: a burst of dispatches should not trigger an
    /// immediate full re-read of the table.
    fn pause_after(&self, dispatched: usize) -> Duration {
        let capacity = self.shared.config.capacity_per_sec.max(1) as u64;
        let scaled = Duration::from_millis(300 + 1_000 * dispatched as u64 / capacity);
        scaled.max(self.shared.config.min_pause())
    }
}

// ---------------------------------------------------------------------------
// Worker-side execution
// ---------------------------------------------------------------------------

fn dispatch_job(shared: Arc<EngineShared>, handler: Arc<dyn Handler>, record: WorkRecord) -> Job {
    Box::pin(execute_record(shared, handler, record))
}

async fn execute_record(
    shared: Arc<EngineShared>,
    handler: Arc<dyn Handler>,
    record: WorkRecord,
) {
    let span = start_record_span(&record.category, &record.id);
    let started = Instant::now();

    let result = handler.execute(&record).instrument(span.clone()).await;
    match result {
        Ok(Execution::Completed(response)) => {
            finalize(&shared, &span, &record, Ok(response), started).await;
        }
        Ok(Execution::Detached(continuation)) => {
            // Non-blocking mode: release the worker slot now, finalize when
            // the continuation resolves. Shutdown may wait for these via
            // the detached tracker, or abandon them.
            debug!(record_id = %record.id, "handler detached, awaiting continuation");
            let guard = shared.detached.register();
            tokio::spawn(async move {
                let _guard = guard;
                let result = continuation.await;
                finalize(&shared, &span, &record, result, started).await;
            });
        }
        Err(e) => {
            finalize(&shared, &span, &record, Err(e), started).await;
        }
    }
}

async fn finalize(
    shared: &Arc<EngineShared>,
    span: &tracing::Span,
    record: &WorkRecord,
    result: Result<Option<String>>,
    started: Instant,
) {
    let elapsed = started.elapsed();
    match result {
        Ok(response) => match shared.finalize_success(record, response, elapsed).await {
            Ok(()) => {
                record_status_transition(span, "initial", "processed");
                info!(
                    record_id = %record.id,
                    category = %record.category,
                    duration_ms = elapsed.as_millis() as u64,
                    "record processed"
                );
            }
            Err(e) => {
                error!(record_id = %record.id, error = %e, "failed to finalize record");
            }
        },
        Err(handler_err) => {
            warn!(
                record_id = %record.id,
                category = %record.category,
                error = %handler_err,
                duration_ms = elapsed.as_millis() as u64,
                "handler failed, recording error"
            );
            match shared
                .finalize_error(record, &handler_err.to_string(), Some(elapsed))
                .await
            {
                Ok(()) => record_status_transition(span, "initial", "error"),
                Err(e) => {
                    error!(record_id = %record.id, error = %e, "failed to record handler error");
                }
            }
        }
    }
}
