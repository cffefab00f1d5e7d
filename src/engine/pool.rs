//! Bounded worker pool.
//!
//! A fixed set of long-lived tokio tasks draining one bounded mpsc channel
//! of boxed jobs. `try_submit` rejects synchronously when the channel is
//! full — that rejection is the backpressure signal the coordinator reads.
//! Workers are plain tokio tasks: they never block process exit, and
//! `abort()` hard-cancels whatever is in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

pub(crate) type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned by [`PoolHandle::try_submit`] when the task queue is full.
#[derive(Debug)]
pub struct Saturated;

/// Cheap clone handed to the coordinator: submit + queue introspection.
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<Job>,
    active: Arc<AtomicUsize>,
    capacity: usize,
}

impl PoolHandle {
    /// Enqueue a job, or reject synchronously when the queue is full.
    pub(crate) fn try_submit(&self, job: Job) -> Result<(), Saturated> {
        self.tx.try_send(job).map_err(|_| Saturated)
    }

    /// Jobs sitting in the queue, not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Jobs currently executing (the coordinator occupies one slot while
    /// the engine runs).
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The coordinator skips a cycle entirely once the queue is within one
    /// slot of capacity.
    pub fn is_saturated(&self) -> bool {
        self.queued() >= self.capacity.saturating_sub(1)
    }
}

/// The pool itself: owns the worker join handles.
pub struct WorkerPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers over a queue of `queue_capacity` slots.
    pub fn start(worker_count: usize, queue_capacity: usize) -> Self {
        let capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let active = Arc::clone(&active);
                tokio::spawn(worker_loop(worker_id, rx, active))
            })
            .collect();

        Self {
            handle: PoolHandle { tx, active, capacity },
            workers,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Hard-cancel all workers. Queued jobs are dropped unrun; in-flight
    /// jobs are aborted at their next await point.
    pub fn abort(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    active: Arc<AtomicUsize>,
) {
    loop {
        // The receiver lock is only held while waiting for the next job;
        // execution happens outside it so workers run concurrently.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker_id, "task queue closed, worker exiting");
            break;
        };
        active.fetch_add(1, Ordering::Relaxed);
        job.await;
        active.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Detached work tracking
// ---------------------------------------------------------------------------

/// Counts in-flight detached continuations (non-blocking handler mode) so a
/// shutdown can wait for them or knowingly abandon them.
#[derive(Clone, Default)]
pub struct DetachedTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    count: AtomicUsize,
    drained: Notify,
}

impl DetachedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one detached continuation; the guard deregisters on drop.
    pub fn register(&self) -> DetachedGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        DetachedGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until no detached work is in flight. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let drained = self.inner.drained.notified();
                tokio::pin!(drained);
                drained.as_mut().enable();
                if self.inner.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                drained.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

pub struct DetachedGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for DetachedGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
