//! End-to-end ordering, delivery, and back-pressure tests for the ring.

use evring::{EventQueue, FnEvent, Monitor, Ring};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Single producer, single consumer: every item observed in sequence
/// order, none lost, none duplicated.
#[test]
fn single_consumer_sees_fifo() {
    const TOTAL: u64 = 1_000_000;

    let ring = Arc::new(Ring::with_capacity(16));
    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..TOTAL {
                ring.enqueue(i);
            }
        })
    };

    let mut expected = 0u64;
    while expected < TOTAL {
        ring.drain(|v| {
            assert_eq!(v, expected, "out-of-order delivery");
            expected += 1;
        });
    }

    producer.join().unwrap();
    assert_eq!(expected, TOTAL);
    assert!(ring.is_empty());
}

/// Four producers, two consumers popping under a shared monitor: each
/// item delivered exactly once, and each producer's items stay in
/// enqueue order within whichever consumer got them.
#[test]
fn multi_consumer_exactly_once_per_producer_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 250_000;
    const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

    let ring = Arc::new(Ring::with_capacity(16));
    let monitor = Arc::new(Monitor::new());
    let consumed = Arc::new(AtomicUsize::new(0));

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                ring.enqueue((p << 32) | i);
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..2 {
        let ring = Arc::clone(&ring);
        let monitor = Arc::clone(&monitor);
        let consumed = Arc::clone(&consumed);
        consumers.push(thread::spawn(move || {
            let mut seen: Vec<u64> = Vec::new();
            while consumed.load(Ordering::Acquire) < TOTAL {
                ring.drain_multi(&monitor, |v| {
                    seen.push(v);
                    consumed.fetch_add(1, Ordering::AcqRel);
                });
                thread::yield_now();
            }
            seen
        }));
    }

    for p in producers {
        p.join().unwrap();
    }
    let observed: Vec<Vec<u64>> = consumers.into_iter().map(|c| c.join().unwrap()).collect();

    let total: usize = observed.iter().map(Vec::len).sum();
    assert_eq!(total, TOTAL);

    // Per-producer order within each consumer's stream.
    for stream in &observed {
        let mut last = [0u64; PRODUCERS as usize];
        let mut started = [false; PRODUCERS as usize];
        for &v in stream {
            let p = (v >> 32) as usize;
            let i = v & 0xFFFF_FFFF;
            if started[p] {
                assert!(i > last[p], "producer {} regressed: {} after {}", p, i, last[p]);
            }
            started[p] = true;
            last[p] = i;
        }
    }

    // Exactly-once across both consumers.
    let mut counts = vec![0u8; TOTAL];
    for stream in &observed {
        for &v in stream {
            let p = v >> 32;
            let i = v & 0xFFFF_FFFF;
            let idx = (p * PER_PRODUCER + i) as usize;
            counts[idx] += 1;
        }
    }
    assert!(counts.iter().all(|&c| c == 1));
}

/// With the ring full and the consumer paused, the next enqueue must not
/// return until the consumer frees a slot.
#[test]
fn full_ring_blocks_producer() {
    const PAUSE: Duration = Duration::from_millis(50);

    let ring = Arc::new(Ring::with_capacity(16));
    for i in 0..16u64 {
        ring.enqueue(i);
    }

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let start = Instant::now();
            ring.enqueue(16);
            start.elapsed()
        })
    };

    // Hold the consumer back, then free exactly one slot.
    thread::sleep(PAUSE);
    assert_eq!(ring.try_pop(), Some(0));

    let blocked_for = producer.join().unwrap();
    assert!(
        blocked_for >= PAUSE - Duration::from_millis(5),
        "producer returned after {:?}, expected to block ~{:?}",
        blocked_for,
        PAUSE
    );

    // Drain the rest, including the late arrival, in order.
    let mut expected = 1u64;
    ring.drain(|v| {
        assert_eq!(v, expected);
        expected += 1;
    });
    assert_eq!(expected, 17);
}

/// Writes done by a producer before enqueue are visible to the consumer
/// during invoke, across threads.
#[test]
fn producer_writes_visible_to_consumer() {
    let queue = Arc::new(EventQueue::with_capacity(16));
    let checked = Arc::new(AtomicUsize::new(0));

    let producer = {
        let queue = Arc::clone(&queue);
        let checked = Arc::clone(&checked);
        thread::spawn(move || {
            for i in 0..1000usize {
                let payload: Vec<usize> = (0..8).map(|k| i + k).collect();
                let checked = Arc::clone(&checked);
                queue.add(FnEvent::boxed(move || {
                    for (k, &v) in payload.iter().enumerate() {
                        assert_eq!(v, i + k);
                    }
                    checked.fetch_add(1, Ordering::SeqCst);
                    true
                }));
            }
        })
    };

    while checked.load(Ordering::SeqCst) < 1000 {
        queue.process();
    }
    producer.join().unwrap();
}

/// Events that report completion are destroyed exactly once; events that
/// transfer themselves elsewhere are not destroyed by the consumer.
#[test]
fn ownership_transfer_skips_destroy() {
    struct Parked {
        slot: Arc<Mutex<Vec<Parked>>>,
        drops: Arc<AtomicUsize>,
    }
    impl Drop for Parked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }
    impl evring::Event for Parked {
        fn invoke(self: Box<Self>) -> bool {
            // Move ourselves to another owner instead of finishing.
            let slot = Arc::clone(&self.slot);
            slot.lock().unwrap().push(*self);
            false
        }
    }

    let parked: Arc<Mutex<Vec<Parked>>> = Arc::new(Mutex::new(Vec::new()));
    let drops = Arc::new(AtomicUsize::new(0));

    let queue = EventQueue::with_capacity(16);
    queue.add(Box::new(Parked {
        slot: Arc::clone(&parked),
        drops: Arc::clone(&drops),
    }));
    queue.process();

    // Still alive in its new home, not destroyed by the consumer.
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(parked.lock().unwrap().len(), 1);

    parked.lock().unwrap().clear();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
