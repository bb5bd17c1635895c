//! A racy directory of idle workers.
//!
//! Producers and donating workers consult this set to steer foreign
//! submissions toward parked workers without scanning the whole pool. The
//! per-slot flags use relaxed exchanges, so a slot may be reported idle
//! stale-ly; `try_acquire_flag` returns whether the caller actually won the
//! idle→active transition, and that result is the only thing callers may
//! rely on. The population counter is approximate and every decision based
//! on it tolerates over- or under-estimation.

use super::worker::hashed_thread_id;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

const IDLE: bool = true;
const ACTIVE: bool = false;

pub(crate) struct IdleWorkerSet {
    flags: Box<[CachePadded<AtomicBool>]>,
    approx_size: AtomicIsize,
}

impl IdleWorkerSet {
    /// All workers start out idle (terminal-parked).
    pub fn new(size: usize) -> Self {
        Self {
            flags: (0..size)
                .map(|_| CachePadded::new(AtomicBool::new(IDLE)))
                .collect(),
            approx_size: AtomicIsize::new(size as isize),
        }
    }

    pub fn set_idle(&self, index: usize) {
        let before = self.flags[index].swap(IDLE, Ordering::Relaxed);
        if before == IDLE {
            return;
        }

        self.approx_size.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active(&self, index: usize) {
        let before = self.flags[index].swap(ACTIVE, Ordering::Relaxed);
        if before == ACTIVE {
            return;
        }

        self.approx_size.fetch_sub(1, Ordering::Relaxed);
    }

    /// Attempt the idle→active transition on one slot. Returns whether this
    /// caller won the race; losing means some other thread already claimed
    /// the worker.
    pub fn try_acquire_flag(&self, index: usize) -> bool {
        if self.flags[index].load(Ordering::Relaxed) == ACTIVE {
            return false;
        }

        let swapped = self.flags[index].swap(ACTIVE, Ordering::Relaxed) == IDLE;
        if swapped {
            self.approx_size.fetch_sub(1, Ordering::Relaxed);
        }

        swapped
    }

    /// Acquire one idle worker other than `caller`, scanning circularly from
    /// the caller's slot (worker threads) or from a hash of the current
    /// thread id (external producers).
    pub fn find_idle_worker(&self, caller: Option<usize>) -> Option<usize> {
        if self.approx_size.load(Ordering::Relaxed) <= 0 {
            return None;
        }

        let size = self.flags.len();
        let start = match caller {
            Some(index) => index,
            None => (hashed_thread_id() % size as u64) as usize,
        };

        for i in 0..size {
            let index = (start + i) % size;
            if Some(index) == caller {
                continue;
            }

            if self.try_acquire_flag(index) {
                return Some(index);
            }
        }

        None
    }

    /// Acquire up to `min(approx, max)` idle workers into `out`, scanning
    /// circularly from `caller` and skipping it. Caller must be a worker of
    /// this pool.
    pub fn find_idle_workers(&self, caller: usize, out: &mut Vec<usize>, max: usize) {
        let approx = self.approx_size.load(Ordering::Relaxed);
        if approx <= 0 {
            return;
        }

        debug_assert!(caller < self.flags.len());

        let size = self.flags.len();
        let wanted = (approx as usize).min(max);
        let mut found = 0;

        for i in 0..size {
            if found == wanted {
                break;
            }

            let index = (caller + i) % size;
            if index == caller {
                continue;
            }

            if self.try_acquire_flag(index) {
                out.push(index);
                found += 1;
            }
        }
    }
}

impl std::fmt::Debug for IdleWorkerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleWorkerSet")
            .field("size", &self.flags.len())
            .field("approx_idle", &self.approx_size.load(Ordering::Relaxed))
            .finish()
    }
}
