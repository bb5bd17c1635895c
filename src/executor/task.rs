//! Task representation and execution.

use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type RunFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;
type InterruptFn = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work submitted to the pool.
///
/// A task is consumed exactly once: either `resume`d by a worker thread, or
/// `interrupt`ed if it is still queued when the pool shuts down.
pub struct Task {
    id: TaskId,
    run: RunFn,
    on_interrupt: Option<InterruptFn>,
}

impl Task {
    /// Create a task from an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::fallible(move || {
            f();
            Ok(())
        })
    }

    /// Create a task whose payload may fail.
    ///
    /// Returning [`Error::Shutdown`](crate::Error::Shutdown) from the payload
    /// signals runtime teardown: the executing worker exits its work loop
    /// cleanly instead of picking up the next task.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            run: Box::new(f),
            on_interrupt: None,
        }
    }

    /// Attach a hook invoked if the task is abandoned at shutdown.
    pub fn on_interrupt<G>(mut self, g: G) -> Self
    where
        G: FnOnce() + Send + 'static,
    {
        self.on_interrupt = Some(Box::new(g));
        self
    }

    /// This task's unique id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Execute the task
    pub(crate) fn resume(self) -> Result<()> {
        (self.run)()
    }

    /// Abandon the task, signalling shutdown-time failure to its interrupt
    /// hook. The payload is dropped unexecuted.
    pub(crate) fn interrupt(self) {
        let Task { on_interrupt, .. } = self;
        if let Some(hook) = on_interrupt {
            hook();
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("interruptible", &self.on_interrupt.is_some())
            .finish()
    }
}
