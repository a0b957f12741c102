//! Cross-thread stress tests for the bounded queue family.
//!
//! Producers push disjoint partitions of `0..N`; consumers pop until every
//! value has been seen. Nothing may be lost or duplicated, and single-side
//! FIFO must hold.
//!
//! Run with: cargo test --package oroboros_lockfree --test queue_stress -- --nocapture

use oroboros_lockfree::{MpmcQueue, MpscQueue, SpmcQueue, SpscQueue};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const SEED: u64 = 0x0B0B_0B05;

/// Checks that `seen` is exactly `0..total`, each value once.
fn assert_exact_cover(mut seen: Vec<u64>, total: u64) {
    seen.sort_unstable();
    assert_eq!(seen.len() as u64, total, "lost or duplicated values");
    for (expected, value) in (0..total).zip(seen) {
        assert_eq!(value, expected, "value {expected} missing or duplicated");
    }
}

#[test]
fn test_mpmc_disjoint_partitions() {
    const PRODUCERS: u64 = 6;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u64 = 50_000;
    const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

    let (tx, rx) = MpmcQueue::<u64>::new(1024).unwrap().split();
    let popped = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::with_capacity(TOTAL as usize)));
    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let mut tx = tx.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(SEED + id);
                let mut next = id * PER_PRODUCER;
                let end = next + PER_PRODUCER;
                while next < end {
                    // Random batch sizes exercise single and range paths.
                    let batch = rng.gen_range(1..=32).min(end - next);
                    let mut items: Vec<u64> = (next..next + batch).collect();
                    next += batch;
                    if rng.gen_bool(0.5) {
                        while !tx.try_push_range(&mut items) {
                            thread::yield_now();
                        }
                    } else {
                        while !items.is_empty() {
                            if tx.push_range(&mut items) == 0 {
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|id| {
            let mut rx = rx.clone();
            let popped = Arc::clone(&popped);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(SEED ^ id as u64);
                let mut local = Vec::new();
                while popped.load(Ordering::Acquire) < TOTAL as usize {
                    let n = match rng.gen_range(0..3) {
                        0 => rx.pop().map_or(0, |value| {
                            local.push(value);
                            1
                        }),
                        1 => rx.pop_range(&mut local, 64),
                        _ => {
                            let want = rng.gen_range(1..=16);
                            if rx.try_pop_range(&mut local, want) {
                                want
                            } else {
                                0
                            }
                        }
                    };
                    if n == 0 {
                        thread::yield_now();
                    } else {
                        popped.fetch_add(n, Ordering::AcqRel);
                    }
                }
                seen.lock().extend(local);
            })
        })
        .collect();

    for handle in producers.into_iter().chain(consumers) {
        handle.join().unwrap();
    }

    println!(
        "mpmc: {TOTAL} values, {PRODUCERS}x{CONSUMERS} threads in {:?}",
        start.elapsed()
    );
    assert!(rx.is_empty());
    drop(tx);
    let seen = std::mem::take(&mut *seen.lock());
    assert_exact_cover(seen, TOTAL);
}

#[test]
fn test_mpsc_per_producer_fifo() {
    const PRODUCERS: u64 = 8;
    const PER_PRODUCER: u64 = 40_000;

    let (tx, mut rx) = MpscQueue::<u64>::new(64).unwrap().split();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let mut tx = tx.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    // Producer id in the high bits, sequence in the low bits.
                    let mut value = (id << 32) | seq;
                    while let Err(back) = tx.push(value) {
                        value = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    let mut next = vec![0u64; PRODUCERS as usize];
    let mut remaining = PRODUCERS * PER_PRODUCER;
    while remaining > 0 {
        let Some(value) = rx.pop() else {
            thread::yield_now();
            continue;
        };
        let id = (value >> 32) as usize;
        let seq = value & 0xFFFF_FFFF;
        assert_eq!(seq, next[id], "producer {id} reordered");
        next[id] += 1;
        remaining -= 1;
    }

    for handle in producers {
        handle.join().unwrap();
    }
    assert!(next.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn test_spsc_ranges_preserve_order() {
    const TOTAL: u64 = 200_000;
    let (mut tx, mut rx) = SpscQueue::<u64>::new(100).unwrap().split();

    let producer = thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut next = 0;
        while next < TOTAL {
            let batch = rng.gen_range(1..=150).min(TOTAL - next);
            let mut items: Vec<u64> = (next..next + batch).collect();
            next += batch;
            while !items.is_empty() {
                if tx.push_range(&mut items) == 0 {
                    thread::yield_now();
                }
            }
        }
    });

    let mut rng = StdRng::seed_from_u64(!SEED);
    let mut out = Vec::new();
    let mut expected = 0;
    while expected < TOTAL {
        if rx.pop_range(&mut out, rng.gen_range(1..=200)) == 0 {
            thread::yield_now();
            continue;
        }
        for value in out.drain(..) {
            assert_eq!(value, expected);
            expected += 1;
        }
    }
    producer.join().unwrap();
}

#[test]
fn test_spmc_strings_survive_the_trip() {
    const TOTAL: usize = 20_000;
    const CONSUMERS: usize = 3;

    let (mut tx, rx) = SpmcQueue::<String>::new(8).unwrap().split();
    let popped = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let mut rx = rx.clone();
            let popped = Arc::clone(&popped);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut local = Vec::new();
                while popped.load(Ordering::Acquire) < TOTAL {
                    match rx.pop() {
                        Some(text) => {
                            local.push(text.parse::<u64>().unwrap());
                            popped.fetch_add(1, Ordering::AcqRel);
                        }
                        None => thread::yield_now(),
                    }
                }
                seen.lock().extend(local);
            })
        })
        .collect();

    for i in 0..TOTAL {
        // Heap-backed values: a double read or a lost write would show up
        // as a crash or a garbled number.
        let mut text = format!("{i:018}");
        while let Err(back) = tx.push(text) {
            text = back;
            thread::yield_now();
        }
    }

    for handle in consumers {
        handle.join().unwrap();
    }
    let seen = std::mem::take(&mut *seen.lock());
    assert_exact_cover(seen, TOTAL as u64);
}
