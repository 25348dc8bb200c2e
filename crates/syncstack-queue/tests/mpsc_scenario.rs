//! End-to-end scenario from the design spec: many producers, one consumer,
//! asserting per-producer order and overall completeness. Scaled down from
//! the million-element stress count so the suite stays fast; the full-scale
//! run is available with `--ignored`.

use std::sync::Arc;
use std::thread;
use syncstack_queue::MpscQueue;

fn run_scenario(producers: usize, per_producer: usize) {
    let q = Arc::new(MpscQueue::<(usize, usize)>::new());
    let mut handles = Vec::new();
    for pid in 0..producers {
        let q = Arc::clone(&q);
        handles.push(thread::spawn(move || {
            for seq in 0..per_producer {
                q.offer((pid, seq)).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let mut last_seen = vec![None; producers];
    let mut total = 0usize;
    while let Some((pid, seq)) = q.poll() {
        if let Some(last) = last_seen[pid] {
            assert!(seq > last, "producer {pid} observed out of order");
        }
        last_seen[pid] = Some(seq);
        total += 1;
    }
    assert_eq!(total, producers * per_producer);
    for (pid, last) in last_seen.iter().enumerate() {
        assert_eq!(*last, Some(per_producer - 1), "producer {pid} missing elements");
    }
}

#[test]
fn mpsc_order_under_contention() {
    let _ = env_logger::try_init();
    run_scenario(8, 5_000);
}

#[test]
#[ignore = "full-scale stress run (8 producers x 1,000,000 elements)"]
fn mpsc_order_full_scale() {
    let _ = env_logger::try_init();
    run_scenario(8, 1_000_000);
}
