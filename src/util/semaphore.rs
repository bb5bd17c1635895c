//! A binary semaphore with deadline-bounded acquisition.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Binary (0/1) semaphore used as a worker wake signal.
///
/// `release` saturates at one permit, so redundant releases collapse into a
/// single wake. Callers that need to distinguish real wakes from stale
/// permits must consult their own state after acquiring.
#[derive(Debug)]
pub struct Semaphore {
    permit: Mutex<bool>,
    wakeup: Condvar,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    /// Make one permit available and wake a waiter, if any.
    pub fn release(&self) {
        let mut permit = self.permit.lock();
        *permit = true;
        drop(permit);
        self.wakeup.notify_one();
    }

    /// Take the permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permit = self.permit.lock();
        let acquired = *permit;
        *permit = false;
        acquired
    }

    /// Block until a permit is available or `deadline` passes.
    ///
    /// Returns whether a permit was taken.
    pub fn try_acquire_until(&self, deadline: Instant) -> bool {
        let mut permit = self.permit.lock();
        loop {
            if *permit {
                *permit = false;
                return true;
            }

            if self.wakeup.wait_until(&mut permit, deadline).timed_out() {
                // one last chance: a release may have landed with the timeout
                let acquired = *permit;
                *permit = false;
                return acquired;
            }
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_after_release() {
        let sem = Semaphore::new();
        assert!(!sem.try_acquire());

        sem.release();
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
    }

    #[test]
    fn test_release_is_binary() {
        let sem = Semaphore::new();
        sem.release();
        sem.release();

        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
    }

    #[test]
    fn test_acquire_until_times_out() {
        let sem = Semaphore::new();
        let start = Instant::now();
        let acquired = sem.try_acquire_until(Instant::now() + Duration::from_millis(50));

        assert!(!acquired);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_cross_thread_wake() {
        let sem = Arc::new(Semaphore::new());
        let releaser = {
            let sem = sem.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                sem.release();
            })
        };

        assert!(sem.try_acquire_until(Instant::now() + Duration::from_secs(5)));
        releaser.join().unwrap();
    }
}
