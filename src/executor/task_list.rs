use super::task::Task;
use std::collections::LinkedList;

/// An owned, single-threaded list of tasks.
///
/// Both queues of a worker are `TaskList`s: the mutex-guarded public inbox
/// and the thread-private run queue. A detached range of tasks is itself a
/// `TaskList`, so batch hand-off between workers is an O(1) splice at either
/// end; only `take_front` walks nodes, and only the `k` it detaches.
#[derive(Debug, Default)]
pub(crate) struct TaskList {
    inner: LinkedList<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self {
            inner: LinkedList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn push_back(&mut self, task: Task) {
        self.inner.push_back(task);
    }

    /// Splice all of `other` onto the back, leaving `other` empty.
    pub fn append(&mut self, other: &mut TaskList) {
        self.inner.append(&mut other.inner);
    }

    /// Splice all of `other` onto the front.
    pub fn prepend(&mut self, other: TaskList) {
        let mut front = other.inner;
        front.append(&mut self.inner);
        self.inner = front;
    }

    pub fn pop_front(&mut self) -> Option<Task> {
        self.inner.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<Task> {
        self.inner.pop_back()
    }

    /// Detach the first `k` tasks as their own list. `k` must not exceed
    /// `len()`.
    pub fn take_front(&mut self, k: usize) -> TaskList {
        debug_assert!(k <= self.len());
        let rest = self.inner.split_off(k);
        TaskList {
            inner: std::mem::replace(&mut self.inner, rest),
        }
    }

    /// Move the whole list out, leaving this one empty.
    pub fn take_all(&mut self) -> TaskList {
        TaskList {
            inner: std::mem::take(&mut self.inner),
        }
    }
}
