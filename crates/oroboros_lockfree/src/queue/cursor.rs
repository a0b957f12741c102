//! # Endpoint Cursors
//!
//! One cursor per queue side. The producer cursor owns `tail`, the consumer
//! cursor owns `head`. Both run the same three-step protocol:
//!
//! ```text
//! reserve   claim [start, start + n) against the other side's public index
//! access    write (producer) or move out (consumer) the claimed slots
//! publish   advance the public index to start + n   (Release)
//! ```
//!
//! `Single` skips the claim CAS and caches the other side's index.
//! `Multi` claims with a CAS on `committed` and publishes in reservation
//! order through `published`.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

pub(crate) mod private {
    use std::sync::atomic::AtomicUsize;

    /// Endpoint protocol, hidden from downstream crates.
    pub trait Sealed: Send + Sync + 'static {
        /// A cursor at index zero.
        fn new() -> Self;

        /// Index the opposite side reads.
        fn public_index(&self) -> &AtomicUsize;

        /// Claims `min ..= want` positions starting at this side's index.
        ///
        /// `available(start, observed)` turns a snapshot of this side's start
        /// and the other side's public index into a position count, or `None`
        /// if the snapshot is inconsistent.
        ///
        /// # Safety
        ///
        /// A single-threaded cursor must only ever be driven by one thread.
        unsafe fn reserve<F>(
            &self,
            want: usize,
            min: usize,
            other: &AtomicUsize,
            available: F,
        ) -> Option<(usize, usize)>
        where
            F: Fn(usize, usize) -> Option<usize>;

        /// Makes `[start, start + count)` visible to the opposite side.
        ///
        /// # Safety
        ///
        /// The range was returned by `reserve` and every slot in it has been
        /// fully written or fully moved out.
        unsafe fn publish(&self, start: usize, count: usize);
    }
}

/// Concurrency mode of one queue endpoint.
///
/// Sealed: the only implementations are [`Single`] and [`Multi`].
pub trait Cursor: private::Sealed {}

/// Endpoint driven by exactly one thread. No CAS on the hot path.
pub struct Single {
    index: CachePadded<AtomicUsize>,
    /// Last-seen public index of the other side. Owner-thread only.
    cached: Cell<usize>,
}

// SAFETY: `cached` is only touched inside `reserve`, which the owning
// handle calls from one thread at a time (`&mut self`, not `Clone`).
unsafe impl Sync for Single {}

impl Cursor for Single {}

impl private::Sealed for Single {
    fn new() -> Self {
        Self {
            index: CachePadded::new(AtomicUsize::new(0)),
            cached: Cell::new(0),
        }
    }

    #[inline]
    fn public_index(&self) -> &AtomicUsize {
        &self.index
    }

    #[inline]
    unsafe fn reserve<F>(
        &self,
        want: usize,
        min: usize,
        other: &AtomicUsize,
        available: F,
    ) -> Option<(usize, usize)>
    where
        F: Fn(usize, usize) -> Option<usize>,
    {
        let start = self.index.load(Ordering::Relaxed);

        // The cache lags the real index, so it can only underestimate.
        let mut count = available(start, self.cached.get()).unwrap_or(0);
        if count < want {
            let observed = other.load(Ordering::Acquire);
            self.cached.set(observed);
            count = available(start, observed)?;
        }

        let count = count.min(want);
        if count == 0 || count < min {
            return None;
        }
        Some((start, count))
    }

    #[inline]
    unsafe fn publish(&self, start: usize, count: usize) {
        self.index.store(start.wrapping_add(count), Ordering::Release);
    }
}

/// Endpoint shared by any number of threads.
pub struct Multi {
    /// Claimed by some thread, possibly still being written or read.
    committed: CachePadded<AtomicUsize>,
    /// Completed and visible to the other side.
    published: CachePadded<AtomicUsize>,
}

impl Cursor for Multi {}

impl private::Sealed for Multi {
    fn new() -> Self {
        Self {
            committed: CachePadded::new(AtomicUsize::new(0)),
            published: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn public_index(&self) -> &AtomicUsize {
        &self.published
    }

    unsafe fn reserve<F>(
        &self,
        want: usize,
        min: usize,
        other: &AtomicUsize,
        available: F,
    ) -> Option<(usize, usize)>
    where
        F: Fn(usize, usize) -> Option<usize>,
    {
        let backoff = Backoff::new();
        loop {
            let start = self.committed.load(Ordering::Relaxed);
            let observed = other.load(Ordering::Acquire);

            // Another thread moved `committed` between the two loads.
            let Some(count) = available(start, observed) else {
                backoff.spin();
                continue;
            };

            let count = count.min(want);
            if count == 0 || count < min {
                // Only give up on a stable snapshot.
                if self.committed.load(Ordering::Relaxed) == start
                    && other.load(Ordering::Acquire) == observed
                {
                    return None;
                }
                continue;
            }

            match self.committed.compare_exchange_weak(
                start,
                start.wrapping_add(count),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((start, count)),
                Err(_) => backoff.spin(),
            }
        }
    }

    unsafe fn publish(&self, start: usize, count: usize) {
        let end = start.wrapping_add(count);
        let backoff = Backoff::new();
        // Earlier reservations publish first.
        while self
            .published
            .compare_exchange_weak(start, end, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::private::Sealed;
    use super::*;

    fn space(capacity: usize) -> impl Fn(usize, usize) -> Option<usize> {
        move |start: usize, head: usize| {
            let used = start.wrapping_sub(head);
            (used <= capacity).then(|| capacity - used)
        }
    }

    #[test]
    fn test_single_reserve_respects_other_side() {
        let head = AtomicUsize::new(0);
        let producer = Single::new();
        unsafe {
            assert_eq!(producer.reserve(3, 1, &head, space(4)), Some((0, 3)));
            producer.publish(0, 3);
            assert_eq!(producer.reserve(3, 1, &head, space(4)), Some((3, 1)));
            assert_eq!(producer.reserve(3, 3, &head, space(4)), None);
            producer.publish(3, 1);
            assert_eq!(producer.reserve(1, 1, &head, space(4)), None);

            // Consumer frees two slots; the stale cache is refreshed.
            head.store(2, Ordering::Release);
            assert_eq!(producer.reserve(5, 1, &head, space(4)), Some((4, 2)));
        }
    }

    #[test]
    fn test_multi_publishes_in_reservation_order() {
        let head = AtomicUsize::new(0);
        let producers = Multi::new();
        unsafe {
            let first = producers.reserve(2, 1, &head, space(8)).unwrap();
            let second = producers.reserve(2, 1, &head, space(8)).unwrap();
            assert_eq!(first, (0, 2));
            assert_eq!(second, (2, 2));
            assert_eq!(producers.public_index().load(Ordering::Acquire), 0);

            producers.publish(first.0, first.1);
            producers.publish(second.0, second.1);
            assert_eq!(producers.public_index().load(Ordering::Acquire), 4);
        }
    }

    #[test]
    fn test_multi_all_or_nothing() {
        let head = AtomicUsize::new(0);
        let producers = Multi::new();
        unsafe {
            assert_eq!(producers.reserve(5, 5, &head, space(4)), None);
            assert_eq!(producers.reserve(4, 4, &head, space(4)), Some((0, 4)));
        }
    }
}
