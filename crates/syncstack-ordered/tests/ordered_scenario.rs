//! End-to-end scenario: many keys, many out-of-order submitters, one pool.
//!
//! 10 keys, 100 tasks with randomly chosen keys submitted from a handful of
//! threads onto a shared `rayon` pool. Each task records its own submission
//! sequence number into a per-key log; once every task has run, each key's
//! log must equal the order its tasks were submitted in, even though the
//! pool itself ran tasks for different keys (and even different tasks for
//! the same key handed off between submitting threads) in whatever order
//! the scheduler chose.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use syncstack_ordered::{OrderedExecutor, RayonExecutor};

#[test]
fn per_key_submission_order_survives_concurrent_out_of_order_dispatch() {
    let _ = env_logger::try_init();

    const KEYS: usize = 10;
    const TASKS: usize = 100;
    const SUBMITTERS: usize = 4;

    let exec = Arc::new(OrderedExecutor::new(RayonExecutor));
    let observed: Arc<DashMap<usize, Mutex<Vec<usize>>>> = Arc::new(DashMap::new());
    let expected: Arc<DashMap<usize, Mutex<Vec<usize>>>> = Arc::new(DashMap::new());
    let remaining = Arc::new(AtomicUsize::new(TASKS));
    let barrier = Arc::new(Barrier::new(SUBMITTERS));

    let mut handles = Vec::new();
    for t in 0..SUBMITTERS {
        let exec = Arc::clone(&exec);
        let observed = Arc::clone(&observed);
        let expected = Arc::clone(&expected);
        let remaining = Arc::clone(&remaining);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut rng_state: u64 = 0x9E3779B97F4A7C15 ^ (t as u64 + 1);
            for i in (t..TASKS).step_by(SUBMITTERS) {
                rng_state ^= rng_state << 13;
                rng_state ^= rng_state >> 7;
                rng_state ^= rng_state << 17;
                let key = (rng_state % KEYS as u64) as usize;

                expected
                    .entry(key)
                    .or_insert_with(|| Mutex::new(Vec::new()))
                    .lock()
                    .unwrap()
                    .push(i);

                let observed = Arc::clone(&observed);
                let remaining = Arc::clone(&remaining);
                exec.submit(key, move || {
                    observed
                        .entry(key)
                        .or_insert_with(|| Mutex::new(Vec::new()))
                        .lock()
                        .unwrap()
                        .push(i);
                    remaining.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while remaining.load(Ordering::SeqCst) > 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(remaining.load(Ordering::SeqCst), 0, "not all tasks completed in time");

    for entry in expected.iter() {
        let key = *entry.key();
        let want = entry.value().lock().unwrap().clone();
        let got = observed
            .get(&key)
            .map(|v| v.lock().unwrap().clone())
            .unwrap_or_default();
        assert_eq!(got, want, "key {key} ran out of submission order");
    }
}

#[test]
fn a_panicking_task_does_not_stall_its_successors() {
    let exec = OrderedExecutor::new(RayonExecutor);
    let after_ran = Arc::new(AtomicUsize::new(0));

    exec.submit("k", || panic!("boom"));
    let after_ran2 = Arc::clone(&after_ran);
    exec.submit("k", move || {
        after_ran2.store(1, Ordering::SeqCst);
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while after_ran.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(after_ran.load(Ordering::SeqCst), 1);
}
