use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tidepool::{Config, Error, Task, ThreadPool};

fn pool(name: &str, size: usize, max_idle_time: Duration) -> ThreadPool {
    let config = Config::builder()
        .pool_name(name)
        .pool_size(size)
        .max_idle_time(max_idle_time)
        .build()
        .unwrap();
    ThreadPool::new(&config).unwrap()
}

fn wait_for(counter: &AtomicUsize, target: usize, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while counter.load(Ordering::Relaxed) < target {
        assert!(
            Instant::now() < deadline,
            "timed out: {} of {} tasks ran",
            counter.load(Ordering::Relaxed),
            target
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_burst_from_external_thread_completes() {
    let pool = pool("burst", 4, Duration::from_millis(100));
    assert_eq!(pool.max_concurrency_level(), 4);

    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..1000 {
        let done = done.clone();
        pool.execute(move || {
            done.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }

    wait_for(&done, 1000, Duration::from_secs(10));
    pool.shutdown();
    assert_eq!(done.load(Ordering::Relaxed), 1000);
}

#[test]
fn test_single_worker_runs_everything() {
    let pool = pool("solo", 1, Duration::from_secs(5));

    let done = Arc::new(AtomicUsize::new(0));
    let threads = Arc::new(Mutex::new(HashSet::<ThreadId>::new()));

    for _ in 0..100 {
        let done = done.clone();
        let threads = threads.clone();
        pool.execute(move || {
            threads.lock().insert(thread::current().id());
            done.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }

    wait_for(&done, 100, Duration::from_secs(10));
    pool.shutdown();

    assert_eq!(threads.lock().len(), 1);
}

#[test]
fn test_submissions_from_inside_a_task_run_lifo() {
    let pool = Arc::new(pool("lifo", 1, Duration::from_secs(5)));

    let done = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let seeder_pool = pool.clone();
    let seeder_done = done.clone();
    let seeder_order = order.clone();
    pool.execute(move || {
        // all five stay on this worker's private queue: the pool has no
        // peer to steer them to, so they fall back to the local path
        for i in 0..5 {
            let done = seeder_done.clone();
            let order = seeder_order.clone();
            seeder_pool
                .execute(move || {
                    order.lock().push(i);
                    done.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }
    })
    .unwrap();

    wait_for(&done, 5, Duration::from_secs(10));
    pool.shutdown();

    // the private queue executes newest-first
    assert_eq!(*order.lock(), vec![4, 3, 2, 1, 0]);
}

#[test]
fn test_burst_from_one_worker_spreads_to_idle_peer() {
    let pool = Arc::new(pool("spread", 2, Duration::from_secs(5)));

    let done = Arc::new(AtomicUsize::new(0));
    let threads = Arc::new(Mutex::new(HashSet::<ThreadId>::new()));

    let seeder_pool = pool.clone();
    let seeder_done = done.clone();
    let seeder_threads = threads.clone();
    pool.execute(move || {
        for _ in 0..16 {
            let done = seeder_done.clone();
            let threads = seeder_threads.clone();
            seeder_pool
                .execute(move || {
                    threads.lock().insert(thread::current().id());
                    thread::sleep(Duration::from_millis(1));
                    done.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }
    })
    .unwrap();

    wait_for(&done, 16, Duration::from_secs(10));
    pool.shutdown();

    // the burst must not stay on the submitting worker
    assert_eq!(threads.lock().len(), 2);
}

#[test]
fn test_worker_respawns_after_idle_timeout() {
    let pool = pool("respawn", 1, Duration::from_millis(50));

    let done = Arc::new(AtomicUsize::new(0));
    let threads = Arc::new(Mutex::new(Vec::<ThreadId>::new()));

    let d = done.clone();
    let t = threads.clone();
    pool.execute(move || {
        t.lock().push(thread::current().id());
        d.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    wait_for(&done, 1, Duration::from_secs(10));

    // comfortably beyond max_idle_time: the worker thread retires
    thread::sleep(Duration::from_millis(500));

    let d = done.clone();
    let t = threads.clone();
    pool.execute(move || {
        t.lock().push(thread::current().id());
        d.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    wait_for(&done, 2, Duration::from_secs(10));

    pool.shutdown();

    let threads = threads.lock();
    assert_eq!(threads.len(), 2);
    assert_ne!(threads[0], threads[1], "expected a fresh thread after idle retirement");
}

#[test]
fn test_shutdown_waits_for_inflight_and_interrupts_queued() {
    let pool = pool("teardown", 1, Duration::from_secs(5));

    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let resumed = Arc::new(AtomicUsize::new(0));
    let interrupted = Arc::new(AtomicUsize::new(0));

    let s = started.clone();
    let f = finished.clone();
    pool.execute(move || {
        s.store(true, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(300));
        f.store(true, Ordering::Relaxed);
    })
    .unwrap();

    // these queue up behind the sleeper on the single worker
    for _ in 0..5 {
        let resumed = resumed.clone();
        let interrupted = interrupted.clone();
        pool.enqueue(
            Task::new(move || {
                resumed.fetch_add(1, Ordering::Relaxed);
            })
            .on_interrupt(move || {
                interrupted.fetch_add(1, Ordering::Relaxed);
            }),
        )
        .unwrap();
    }

    while !started.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(1));
    }

    pool.shutdown();

    assert!(
        finished.load(Ordering::Relaxed),
        "shutdown returned while a task was still in flight"
    );
    assert_eq!(resumed.load(Ordering::Relaxed), 0);
    assert_eq!(interrupted.load(Ordering::Relaxed), 5);
}

#[test]
fn test_shutdown_is_idempotent() {
    let pool = pool("idem", 2, Duration::from_secs(5));

    pool.shutdown();
    pool.shutdown();

    assert!(pool.shutdown_requested());
    assert_eq!(pool.max_concurrency_level(), 2);

    let err = pool.execute(|| {}).unwrap_err();
    assert!(err.is_shutdown());
}

#[test]
fn test_drop_without_shutdown_loses_nothing() {
    let resumed = Arc::new(AtomicUsize::new(0));
    let interrupted = Arc::new(AtomicUsize::new(0));

    {
        let pool = pool("dropped", 2, Duration::from_secs(5));
        for _ in 0..500 {
            let resumed = resumed.clone();
            let interrupted = interrupted.clone();
            pool.enqueue(
                Task::new(move || {
                    resumed.fetch_add(1, Ordering::Relaxed);
                })
                .on_interrupt(move || {
                    interrupted.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();
        }
    }

    // drop joined every worker, so the counts are settled
    assert_eq!(
        resumed.load(Ordering::Relaxed) + interrupted.load(Ordering::Relaxed),
        500
    );
}

#[test]
fn test_task_shutdown_error_retires_worker_cleanly() {
    let pool = pool("poison", 1, Duration::from_secs(5));

    let errored = Arc::new(AtomicBool::new(false));
    let e = errored.clone();
    pool.enqueue(Task::fallible(move || {
        e.store(true, Ordering::Relaxed);
        Err(Error::shutdown("poison"))
    }))
    .unwrap();

    while !errored.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(1));
    }
    // give the worker time to finish retiring its thread
    thread::sleep(Duration::from_millis(100));

    // the pool itself is not shut down; a new submission respawns the worker
    let done = Arc::new(AtomicUsize::new(0));
    let d = done.clone();
    pool.execute(move || {
        d.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    wait_for(&done, 1, Duration::from_secs(10));
    pool.shutdown();
}

#[test]
fn test_panicking_task_does_not_kill_worker() {
    let pool = pool("panics", 1, Duration::from_secs(5));

    pool.execute(|| panic!("boom")).unwrap();

    let done = Arc::new(AtomicUsize::new(0));
    let d = done.clone();
    pool.execute(move || {
        d.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    wait_for(&done, 1, Duration::from_secs(10));
    pool.shutdown();
}

#[test]
fn test_no_loss_under_concurrent_producers() {
    let pool = Arc::new(pool("stress", 4, Duration::from_millis(100)));

    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 10_000;

    let resumed = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let pool = pool.clone();
            let resumed = resumed.clone();
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    let resumed = resumed.clone();
                    pool.execute(move || {
                        resumed.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    wait_for(&resumed, PRODUCERS * PER_PRODUCER, Duration::from_secs(60));
    pool.shutdown();
    assert_eq!(resumed.load(Ordering::Relaxed), PRODUCERS * PER_PRODUCER);
}
