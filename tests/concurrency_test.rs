//! Concurrency Test - Backpressure & Multiset Preservation
//!
//! Skenario multi-thread untuk ring buffer MPMC:
//! - Buffer penuh: push tambahan spin sampai ada pop
//! - Buffer kosong: pop spin sampai ada push
//! - P producer x C consumer: semua item keluar tepat sekali
//!
//! Usage:
//!   cargo test --release --test concurrency_test -- --nocapture

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spinring::RingBuffer;

/// Waktu tunggu untuk memastikan operasi yang spin memang belum selesai
const SETTLE: Duration = Duration::from_millis(50);

fn shared<T>(capacity: usize) -> Arc<RingBuffer<T>> {
    Arc::new(RingBuffer::with_capacity(capacity).unwrap())
}

#[test]
fn test_capacity_four_scenario() {
    let rb = shared::<char>(4);

    for c in ['A', 'B', 'C', 'D'] {
        rb.push(Box::new(c));
    }
    assert!(rb.is_full());

    let done = Arc::new(AtomicBool::new(false));
    let pusher = {
        let rb = Arc::clone(&rb);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            rb.push(Box::new('E'));
            done.store(true, Ordering::Release);
        })
    };

    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::Acquire), "push E completed on a full buffer");

    assert_eq!(*rb.pop(), 'A');
    pusher.join().unwrap();
    assert!(done.load(Ordering::Acquire));

    let rest: Vec<char> = (0..4).map(|_| *rb.pop()).collect();
    assert_eq!(rest, ['B', 'C', 'D', 'E']);
    assert!(rb.is_empty());
}

#[test]
fn test_pop_waits_on_empty_buffer() {
    let rb = shared::<u32>(2);
    let done = Arc::new(AtomicBool::new(false));

    let popper = {
        let rb = Arc::clone(&rb);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let item = rb.pop();
            done.store(true, Ordering::Release);
            *item
        })
    };

    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::Acquire), "pop completed on an empty buffer");

    rb.push(Box::new(99));
    assert_eq!(popper.join().unwrap(), 99);
}

#[test]
fn test_multiset_preserved_mpmc() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 20_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let rb = shared::<usize>(64);
    let remaining = Arc::new(AtomicUsize::new(TOTAL));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    rb.push(Box::new(p * PER_PRODUCER + i));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let rb = Arc::clone(&rb);
            let remaining = Arc::clone(&remaining);
            thread::spawn(move || {
                let mut got = Vec::new();
                // Klaim kuota dulu supaya tidak ada consumer yang pop
                // setelah semua item habis
                while remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok()
                {
                    got.push(*rb.pop());
                }
                got
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }

    let mut seen = HashSet::with_capacity(TOTAL);
    for h in consumers {
        for id in h.join().unwrap() {
            assert!(seen.insert(id), "item {} popped twice", id);
        }
    }

    assert_eq!(seen.len(), TOTAL);
    assert!((0..TOTAL).all(|id| seen.contains(&id)));
    assert!(rb.is_empty());
}

#[test]
fn test_occupancy_never_exceeds_capacity() {
    const CAPACITY: usize = 8;
    let rb = shared::<u64>(CAPACITY);
    let stop = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let rb = Arc::clone(&rb);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut i = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    if w % 2 == 0 {
                        let _ = rb.try_push(Box::new(i));
                    } else {
                        let _ = rb.try_pop();
                    }
                    i += 1;
                }
            })
        })
        .collect();

    for _ in 0..10_000 {
        let len = rb.len();
        assert!(len <= CAPACITY, "occupancy {} > capacity", len);
    }

    stop.store(true, Ordering::Relaxed);
    for h in workers {
        h.join().unwrap();
    }

    let mut drained = 0;
    while rb.try_pop().is_some() {
        drained += 1;
    }
    assert!(drained <= CAPACITY);
}

#[test]
fn test_spsc_fifo_across_threads() {
    const N: u32 = 50_000;
    let rb = shared::<u32>(3);

    let producer = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || {
            for i in 0..N {
                rb.push(Box::new(i));
            }
        })
    };

    let consumer = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || (0..N).map(|_| *rb.pop()).collect::<Vec<_>>())
    };

    producer.join().unwrap();
    let popped = consumer.join().unwrap();
    assert_eq!(popped, (0..N).collect::<Vec<_>>());
}

#[test]
fn test_push_timeout_released_by_pop() {
    let rb = shared::<u8>(1);
    rb.push(Box::new(1));

    let pusher = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || rb.push_timeout(Box::new(2), Duration::from_secs(10)).is_ok())
    };

    thread::sleep(SETTLE);
    assert_eq!(*rb.pop(), 1);
    assert!(pusher.join().unwrap());
    assert_eq!(*rb.pop(), 2);
}
