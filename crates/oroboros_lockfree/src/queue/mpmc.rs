//! # MPMC Queue
//!
//! Both sides claim with a CAS and publish in claim order. Order between
//! two producers (or two consumers) is whatever order their claims won.

use super::{BoundedQueue, Consumer, Multi, Producer};
use crate::memory::SystemAllocator;

/// Multi-producer, multi-consumer bounded queue.
pub type MpmcQueue<T, A = SystemAllocator> = BoundedQueue<T, Multi, Multi, A>;

/// Write end of an [`MpmcQueue`]. Clone one per producer thread.
pub type MpmcProducer<T, A = SystemAllocator> = Producer<T, Multi, Multi, A>;

/// Read end of an [`MpmcQueue`]. Clone one per consumer thread.
pub type MpmcConsumer<T, A = SystemAllocator> = Consumer<T, Multi, Multi, A>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_fails_exactly_when_full() {
        let (mut tx, mut rx) = MpmcQueue::<u8>::new(1).unwrap().split();
        assert!(tx.push(1).is_ok());
        assert_eq!(tx.push(2), Err(2));
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), None);
        assert!(tx.push(2).is_ok());
    }

    #[test]
    fn test_capacity_eight_strings() {
        let (mut tx, mut rx) = MpmcQueue::<String>::new(8).unwrap().split();
        let long = String::from("abcdefghijklmnopqr");
        for _ in 0..8 {
            assert!(tx.push(long.clone()).is_ok());
        }
        assert_eq!(tx.push(String::from("abcde")), Err(String::from("abcde")));
        for _ in 0..8 {
            assert_eq!(rx.pop().as_deref(), Some(long.as_str()));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_sum_converges_under_contention() {
        const PRODUCERS: u64 = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: u64 = 25_000;
        const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

        let (tx, rx) = MpmcQueue::<u64>::new(256).unwrap().split();
        let received = Arc::new(AtomicUsize::new(0));
        let sum = Arc::new(AtomicU64::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|id| {
                let mut tx = tx.clone();
                thread::spawn(move || {
                    for value in id * PER_PRODUCER..(id + 1) * PER_PRODUCER {
                        let mut value = value;
                        while let Err(back) = tx.push(value) {
                            value = back;
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let mut rx = rx.clone();
                let received = Arc::clone(&received);
                let sum = Arc::clone(&sum);
                thread::spawn(move || {
                    let mut out = Vec::with_capacity(16);
                    while received.load(Ordering::Acquire) < TOTAL as usize {
                        let n = rx.pop_range(&mut out, 16);
                        if n == 0 {
                            thread::yield_now();
                            continue;
                        }
                        sum.fetch_add(out.drain(..).sum::<u64>(), Ordering::Relaxed);
                        received.fetch_add(n, Ordering::AcqRel);
                    }
                })
            })
            .collect();

        for handle in producers.into_iter().chain(consumers) {
            handle.join().unwrap();
        }
        assert_eq!(received.load(Ordering::Acquire), TOTAL as usize);
        assert_eq!(sum.load(Ordering::Relaxed), TOTAL * (TOTAL - 1) / 2);
        drop(tx);
        assert!(rx.is_empty());
    }
}
