use super::idle_set::IdleWorkerSet;
use super::task::Task;
use super::worker::{self, Worker};
use crate::config::Config;
use crate::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A fixed-size worker thread pool.
///
/// Submissions are steered toward idle workers through the idle-worker set;
/// a worker submitting from inside one of its own tasks keeps work on its
/// private queue when it has no foreign backlog. Workers park on a binary
/// semaphore when out of work and retire their thread after
/// `max_idle_time`; a later submission respawns it.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    name: String,
    workers: Vec<Worker>,
    idle_workers: IdleWorkerSet,
    round_robin_cursor: AtomicUsize,
    abort: AtomicBool,
    max_idle_time: Duration,
}

impl PoolInner {
    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn worker_at(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    pub(crate) fn find_idle_workers(&self, caller: usize, out: &mut Vec<usize>, max: usize) {
        self.idle_workers.find_idle_workers(caller, out, max);
    }

    pub(crate) fn mark_worker_idle(&self, index: usize) {
        debug_assert!(index < self.workers.len());
        self.idle_workers.set_idle(index);
    }

    pub(crate) fn mark_worker_active(&self, index: usize) {
        debug_assert!(index < self.workers.len());
        self.idle_workers.set_active(index);
    }
}

impl ThreadPool {
    /// Create a pool. No threads are spawned up front; each worker's thread
    /// starts on the first submission routed to it.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let pool_size = config.worker_threads();
        let workers = (0..pool_size)
            .map(|index| {
                Worker::new(
                    index,
                    config.pool_name.clone(),
                    config.max_idle_time,
                    config.stack_size,
                )
            })
            .collect();

        tracing::debug!(pool = %config.pool_name, size = pool_size, "thread pool created");

        Ok(Self {
            inner: Arc::new(PoolInner {
                name: config.pool_name.clone(),
                workers,
                idle_workers: IdleWorkerSet::new(pool_size),
                round_robin_cursor: AtomicUsize::new(0),
                abort: AtomicBool::new(false),
                max_idle_time: config.max_idle_time,
            }),
        })
    }

    /// Submit a task.
    ///
    /// Routing, in order: the current worker's private queue when it appears
    /// empty, an idle peer acquired from the idle-worker set, the current
    /// worker again, and finally round-robin over the pool.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        let inner = &self.inner;
        let current = worker::current_worker_index(inner);

        if let Some(index) = current {
            let this_worker = inner.worker_at(index);
            // SAFETY: `current` proves this thread owns that worker.
            if unsafe { this_worker.appears_empty() } {
                return unsafe { this_worker.enqueue_local(task) };
            }
        }

        if let Some(index) = inner.idle_workers.find_idle_worker(current) {
            return inner.worker_at(index).enqueue_foreign(inner, task);
        }

        if let Some(index) = current {
            // SAFETY: as above.
            return unsafe { inner.worker_at(index).enqueue_local(task) };
        }

        let next = inner.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % inner.size();
        inner.worker_at(next).enqueue_foreign(inner, task)
    }

    /// Submit a closure as a task.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Task::new(f))
    }

    /// Stop the pool: no further submissions succeed, every worker thread is
    /// joined, and every still-queued task is interrupted exactly once.
    /// Idempotent; concurrent calls beyond the first are no-ops.
    pub fn shutdown(&self) {
        if self.inner.abort.swap(true, Ordering::Relaxed) {
            return; // shutdown had been called before
        }

        tracing::debug!(pool = %self.inner.name, "shutting down");

        for worker in &self.inner.workers {
            worker.shutdown();
        }
    }

    /// Whether `shutdown` has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.inner.abort.load(Ordering::Relaxed)
    }

    /// Number of workers, i.e. the maximum number of tasks that can run at
    /// once.
    pub fn max_concurrency_level(&self) -> usize {
        self.inner.size()
    }

    /// How long a worker with no work keeps its thread alive.
    pub fn max_worker_idle_time(&self) -> Duration {
        self.inner.max_idle_time
    }

    /// The pool's name, also the prefix of its worker thread names.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("pool_size", &self.inner.size())
            .field("shutdown_requested", &self.shutdown_requested())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
