//! Worker threads: queues, the wake/park protocol, and work donation.

use super::pool::PoolInner;
use super::task::Task;
use super::task_list::TaskList;
use crate::error::{Error, Result};
use crate::util::Semaphore;
use parking_lot::{Mutex, MutexGuard};
use std::cell::{Cell, UnsafeCell};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Identity of the worker owning the current thread, recorded on work-loop
// entry. Producers that are not workers observe `None` and take the foreign
// submission paths.
#[derive(Clone, Copy)]
struct CurrentWorker {
    pool: *const PoolInner,
    index: usize,
}

thread_local! {
    static CURRENT_WORKER: Cell<Option<CurrentWorker>> = const { Cell::new(None) };

    static HASHED_THREAD_ID: u64 = {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        hasher.finish()
    };
}

/// Index of the current thread's worker, if it belongs to `pool`.
pub(crate) fn current_worker_index(pool: &PoolInner) -> Option<usize> {
    CURRENT_WORKER.with(|current| {
        current
            .get()
            .filter(|w| std::ptr::eq(w.pool, pool))
            .map(|w| w.index)
    })
}

/// Stable per-thread hash, used as the circular-scan start for producers
/// that have no worker index of their own.
pub(crate) fn hashed_thread_id() -> u64 {
    HASHED_THREAD_ID.with(|h| *h)
}

// State guarded by the worker's mutex.
struct Shared {
    public_queue: TaskList,
    idle: bool,
    abort: bool,
    thread: Option<JoinHandle<()>>,
}

pub(crate) struct Worker {
    index: usize,
    pool_name: String,
    stack_size: Option<usize>,
    max_idle_time: Duration,
    atomic_abort: AtomicBool,
    task_found_or_abort: AtomicBool,
    semaphore: Semaphore,
    shared: Mutex<Shared>,
    private_queue: UnsafeCell<TaskList>,
}

// SAFETY: every field but `private_queue` is synchronized (mutex, atomics,
// semaphore). `private_queue` is touched only through `Worker::private`,
// whose contract restricts access to the owning worker thread, or to the
// shutdown path after that thread has been joined.
unsafe impl Sync for Worker {}

impl Worker {
    /// Workers start terminal-parked: no thread, `idle` set. The first
    /// foreign enqueue spawns the thread.
    pub(crate) fn new(
        index: usize,
        pool_name: String,
        max_idle_time: Duration,
        stack_size: Option<usize>,
    ) -> Self {
        Self {
            index,
            pool_name,
            stack_size,
            max_idle_time,
            atomic_abort: AtomicBool::new(false),
            task_found_or_abort: AtomicBool::new(false),
            semaphore: Semaphore::new(),
            shared: Mutex::new(Shared {
                public_queue: TaskList::new(),
                idle: true,
                abort: false,
                thread: None,
            }),
            private_queue: UnsafeCell::new(TaskList::new()),
        }
    }

    /// # Safety
    ///
    /// The caller must be the owning worker thread, or the shutdown path
    /// after the worker thread has been joined. The returned borrow must not
    /// be held across any call that can reach `private` again (task
    /// execution, donation to peers).
    #[allow(clippy::mut_from_ref)]
    unsafe fn private(&self) -> &mut TaskList {
        unsafe { &mut *self.private_queue.get() }
    }

    /// Hint used by the pool's fast path: no private work and no pending
    /// foreign signal. Races with concurrent foreign enqueues are fine;
    /// a false positive just keeps a submission local.
    ///
    /// # Safety
    ///
    /// The caller must be the owning worker thread.
    pub(crate) unsafe fn appears_empty(&self) -> bool {
        unsafe { self.private() }.is_empty() && !self.task_found_or_abort.load(Ordering::Relaxed)
    }

    /// Append to the private queue, no locking.
    ///
    /// # Safety
    ///
    /// The caller must be the owning worker thread.
    pub(crate) unsafe fn enqueue_local(&self, task: Task) -> Result<()> {
        if self.atomic_abort.load(Ordering::Relaxed) {
            return Err(Error::shutdown(&self.pool_name));
        }

        unsafe { self.private() }.push_back(task);
        Ok(())
    }

    /// Submission from any thread: locked append to the public inbox, then
    /// the wake protocol.
    pub(crate) fn enqueue_foreign(&self, pool: &Arc<PoolInner>, task: Task) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.abort {
            return Err(Error::shutdown(&self.pool_name));
        }

        self.task_found_or_abort.store(true, Ordering::Relaxed);

        let first_enqueuer = shared.public_queue.is_empty();
        shared.public_queue.push_back(task);
        self.ensure_worker_active(pool, first_enqueuer, shared)
    }

    /// Batch variant used by donation. On failure the batch is left intact
    /// for the caller to reclaim.
    pub(crate) fn enqueue_foreign_batch(
        &self,
        pool: &Arc<PoolInner>,
        batch: &mut TaskList,
    ) -> Result<()> {
        debug_assert!(!batch.is_empty());

        let mut shared = self.shared.lock();
        if shared.abort {
            return Err(Error::shutdown(&self.pool_name));
        }

        self.task_found_or_abort.store(true, Ordering::Relaxed);

        let first_enqueuer = shared.public_queue.is_empty();
        shared.public_queue.append(batch);
        self.ensure_worker_active(pool, first_enqueuer, shared)
    }

    // The wake protocol. With the lock held on entry:
    //   - running worker: unlock, then at most one semaphore release per
    //     empty→non-empty transition of the public queue (`first_enqueuer`),
    //     so a burst of producers cannot saturate the semaphore;
    //   - parked worker: swap in a fresh thread, then join the stale handle
    //     outside the critical section. No release on this branch; the new
    //     thread finds its work immediately.
    fn ensure_worker_active(
        &self,
        pool: &Arc<PoolInner>,
        first_enqueuer: bool,
        mut shared: MutexGuard<'_, Shared>,
    ) -> Result<()> {
        if !shared.idle {
            drop(shared);

            if first_enqueuer {
                self.semaphore.release();
            }

            return Ok(());
        }

        let stale_worker = shared.thread.take();

        let pool = Arc::clone(pool);
        let index = self.index;
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.pool_name, index));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        match builder.spawn(move || pool.worker_at(index).work_loop(&pool)) {
            Ok(handle) => shared.thread = Some(handle),
            Err(spawn_err) => {
                shared.thread = stale_worker;
                return Err(Error::Spawn(spawn_err));
            }
        }

        shared.idle = false;
        drop(shared);

        if let Some(stale_worker) = stale_worker {
            let _ = stale_worker.join();
        }

        Ok(())
    }

    fn work_loop(&self, pool: &Arc<PoolInner>) {
        CURRENT_WORKER.with(|current| {
            current.set(Some(CurrentWorker {
                pool: Arc::as_ptr(pool),
                index: self.index,
            }));
        });

        tracing::trace!(worker = self.index, pool = %self.pool_name, "worker thread started");

        loop {
            match self.drain_queue(pool) {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    // runtime teardown surfaced through a task
                    self.shared.lock().idle = true;
                    break;
                }
            }
        }

        tracing::trace!(worker = self.index, pool = %self.pool_name, "worker thread exiting");
    }

    // One wake-drain cycle. Returns Ok(false) when the thread should exit.
    fn drain_queue(&self, pool: &Arc<PoolInner>) -> Result<bool> {
        let shared = self.shared.lock();
        let Some(mut shared) = self.wait_for_task(pool, shared) else {
            return Ok(false);
        };

        debug_assert!(!shared.public_queue.is_empty() || shared.abort);
        self.task_found_or_abort.store(false, Ordering::Relaxed);

        if shared.abort {
            shared.idle = true;
            return Ok(false);
        }

        {
            // SAFETY: we are the owning worker thread.
            let private = unsafe { self.private() };
            // normally empty here, but a previous thread that exited
            // mid-drain (teardown error, failed donation spawn) leaves its
            // remaining tasks behind; merge them ahead of the new batch so
            // they still drain
            private.append(&mut shared.public_queue);
        }
        drop(shared);

        self.drain_queue_impl(pool)
    }

    // The park protocol. Consumes the guard; returns it re-held iff an event
    // was found (public work or abort). `None` means the thread should exit:
    // idle timeout or abort, with `idle` already set under the lock.
    fn wait_for_task<'a>(
        &'a self,
        pool: &PoolInner,
        guard: MutexGuard<'a, Shared>,
    ) -> Option<MutexGuard<'a, Shared>> {
        if !guard.public_queue.is_empty() || guard.abort {
            return Some(guard);
        }

        drop(guard);

        pool.mark_worker_idle(self.index);

        let deadline = Instant::now() + self.max_idle_time;
        let reacquired = loop {
            if !self.semaphore.try_acquire_until(deadline) {
                if Instant::now() <= deadline {
                    continue; // spurious return from the timed wait
                }
                break None;
            }

            if !self.task_found_or_abort.load(Ordering::Relaxed) {
                continue; // stale permit, nothing actually happened
            }

            let shared = self.shared.lock();
            if shared.public_queue.is_empty() && !shared.abort {
                // a peer resolved this wake before we got the lock
                drop(shared);
                continue;
            }

            break Some(shared);
        };

        match reacquired {
            Some(mut shared) => {
                if shared.abort {
                    shared.idle = true;
                    return None;
                }

                debug_assert!(!shared.public_queue.is_empty());
                pool.mark_worker_active(self.index);
                Some(shared)
            }
            None => {
                // idle timeout: retire the thread
                let mut shared = self.shared.lock();
                shared.idle = true;
                tracing::trace!(worker = self.index, "idle timeout, worker thread retiring");
                None
            }
        }
    }

    // Run the private queue down, donating excess before each task. Popping
    // from the back keeps local execution on the freshest (cache-warm) work
    // while donations take the oldest tasks from the front.
    fn drain_queue_impl(&self, pool: &Arc<PoolInner>) -> Result<bool> {
        let mut aborted = false;

        loop {
            // SAFETY: owning worker thread; borrow ends at the statement.
            if unsafe { self.private() }.is_empty() {
                break;
            }

            self.balance_work(pool)?;

            if self.atomic_abort.load(Ordering::Relaxed) {
                aborted = true;
                break;
            }

            // SAFETY: owning worker thread; `balance_work` keeps >= 1 task.
            let Some(task) = (unsafe { self.private() }.pop_back()) else {
                break;
            };
            self.run_task(task)?;
        }

        if aborted {
            self.shared.lock().idle = true;
            return Ok(false);
        }

        Ok(true)
    }

    fn run_task(&self, task: Task) -> Result<()> {
        let id = task.id();

        match catch_unwind(AssertUnwindSafe(|| task.resume())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.is_shutdown() => Err(err),
            Ok(Err(err)) => {
                tracing::error!(worker = self.index, task = ?id, %err, "task failed");
                Ok(())
            }
            Err(_) => {
                tracing::error!(worker = self.index, task = ?id, "task panicked");
                Ok(())
            }
        }
    }

    // Donation: split the private queue evenly with however many idle peers
    // we can acquire, keeping at least one task (and the remainder shares)
    // for ourselves.
    fn balance_work(&self, pool: &Arc<PoolInner>) -> Result<()> {
        // SAFETY (here and below): owning worker thread, statement-scoped.
        let task_count = unsafe { self.private() }.len();
        if task_count < 2 {
            return Ok(()); // nothing to spare
        }

        let max_idle_workers = (pool.size() - 1).min(task_count - 1);
        if max_idle_workers == 0 {
            return Ok(()); // single-worker pool
        }

        let mut idle_workers = Vec::with_capacity(max_idle_workers);
        pool.find_idle_workers(self.index, &mut idle_workers, max_idle_workers);

        let idle_count = idle_workers.len();
        if idle_count == 0 {
            return Ok(());
        }

        debug_assert!(idle_count <= task_count);
        let total_worker_count = idle_count + 1; // count ourselves, otherwise we'd donate everything
        let donation_count = task_count / total_worker_count;
        let mut extra = task_count - donation_count * total_worker_count;

        tracing::trace!(
            worker = self.index,
            tasks = task_count,
            peers = idle_count,
            "donating work"
        );

        for &peer in &idle_workers {
            debug_assert_ne!(peer, self.index);

            let mut share = donation_count;
            if extra > 0 {
                share += 1;
                extra -= 1;
            }

            let mut batch = unsafe { self.private() }.take_front(share);
            if let Err(err) = pool.worker_at(peer).enqueue_foreign_batch(pool, &mut batch) {
                // peer is tearing down: reclaim the batch so our own
                // shutdown drain still sees every task
                unsafe { self.private() }.prepend(batch);
                return Err(err);
            }
        }

        debug_assert!(!unsafe { self.private() }.is_empty());
        Ok(())
    }

    /// Tear the worker down: flag, wake, join, then interrupt everything
    /// still queued (public first, then private, front-to-back). Called
    /// exactly once, from the pool's shutdown.
    pub(crate) fn shutdown(&self) {
        debug_assert!(!self.atomic_abort.load(Ordering::Relaxed));
        self.atomic_abort.store(true, Ordering::Relaxed);

        {
            let mut shared = self.shared.lock();
            shared.abort = true;
        }

        self.task_found_or_abort.store(true, Ordering::Relaxed);
        self.semaphore.release();

        // join outside the critical section
        let thread = self.shared.lock().thread.take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }

        let (mut public_queue, mut private_queue) = {
            let mut shared = self.shared.lock();
            let public_queue = shared.public_queue.take_all();
            // SAFETY: the worker thread is joined and enqueue_local is
            // rejected by `atomic_abort`; nothing else can touch the
            // private queue now.
            let private_queue = unsafe { self.private() }.take_all();
            (public_queue, private_queue)
        };

        let interrupted = public_queue.len() + private_queue.len();
        if interrupted > 0 {
            tracing::debug!(
                worker = self.index,
                count = interrupted,
                "interrupting queued tasks"
            );
        }

        while let Some(task) = public_queue.pop_front() {
            task.interrupt();
        }

        while let Some(task) = private_queue.pop_front() {
            task.interrupt();
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("pool", &self.pool_name)
            .finish()
    }
}
