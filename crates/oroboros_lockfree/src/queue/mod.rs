//! # Bounded Lock-Free Queues
//!
//! ARCHITECT'S ORDER: Fixed capacity. Never block. Never lose an element.
//!
//! ## Layout
//!
//! ```text
//!             producers                          consumers
//!                 │                                  ▲
//!        reserve ─┤ tail cursor            head cursor ├─ reserve
//!                 ▼                                  │
//!   ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//!   │     │ ●●● │ ●●● │ ●●● │ ●●● │     │     │     │   RingStorage
//!   └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!          head ───── live ─────▶ tail
//! ```
//!
//! `tail - head` is the number of live elements and never exceeds the
//! capacity. Indices run free and wrap only at `usize::MAX`, so a stale
//! index can never be mistaken for a current one.
//!
//! ## Variants
//!
//! | Queue        | Producer side | Consumer side |
//! |--------------|---------------|---------------|
//! | [`SpscQueue`] | [`Single`]   | [`Single`]    |
//! | [`MpscQueue`] | [`Multi`]    | [`Single`]    |
//! | [`SpmcQueue`] | [`Single`]   | [`Multi`]     |
//! | [`MpmcQueue`] | [`Multi`]    | [`Multi`]     |
//!
//! A queue is built once and [`split`](BoundedQueue::split) into a
//! [`Producer`] and a [`Consumer`]. Handles on a `Multi` side are `Clone`,
//! one per thread. Handles on a `Single` side are not, so the type system
//! enforces the single-thread requirement.
//!
//! Full and empty are ordinary return values. Backpressure is the caller's
//! business.

#![allow(unsafe_code)]

mod cursor;
mod mpmc;
mod mpsc;
mod ring;
mod spmc;
mod spsc;

use std::mem;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::QueueConfig;
use crate::error::LockfreeResult;
use crate::memory::{RawAllocator, SystemAllocator};

use ring::RingStorage;

pub use cursor::{Cursor, Multi, Single};
pub use mpmc::{MpmcConsumer, MpmcProducer, MpmcQueue};
pub use mpsc::{MpscConsumer, MpscProducer, MpscQueue};
pub use spmc::{SpmcConsumer, SpmcProducer, SpmcQueue};
pub use spsc::{SpscConsumer, SpscProducer, SpscQueue};

/// Free slots for a producer at `tail`, given the consumers' public `head`.
fn free_slots(capacity: usize) -> impl Fn(usize, usize) -> Option<usize> {
    move |tail, head| {
        let used = tail.wrapping_sub(head);
        (used <= capacity).then(|| capacity - used)
    }
}

/// Ready elements for a consumer at `head`, given the producers' public `tail`.
fn ready_slots(capacity: usize) -> impl Fn(usize, usize) -> Option<usize> {
    move |head, tail| {
        let ready = tail.wrapping_sub(head);
        (ready <= capacity).then_some(ready)
    }
}

/// Fixed-capacity ring queue, generic over the concurrency of each side.
///
/// Use the aliases ([`SpscQueue`], [`MpscQueue`], [`SpmcQueue`],
/// [`MpmcQueue`]) rather than naming the cursors directly.
pub struct BoundedQueue<T, P: Cursor, C: Cursor, A: RawAllocator = SystemAllocator> {
    /// Producer side, owns `tail`.
    tail: P,
    /// Consumer side, owns `head`.
    head: C,
    ring: RingStorage<T, A>,
}

// SAFETY: values cross threads only through the reserve/publish protocol,
// which hands each slot to exactly one thread at a time.
unsafe impl<T: Send, P: Cursor, C: Cursor, A: RawAllocator> Send for BoundedQueue<T, P, C, A> {}
// SAFETY: as above; shared access never yields `&T`.
unsafe impl<T: Send, P: Cursor, C: Cursor, A: RawAllocator> Sync for BoundedQueue<T, P, C, A> {}

impl<T, P: Cursor, C: Cursor> BoundedQueue<T, P, C> {
    /// Creates a queue of `capacity` slots on the system allocator.
    ///
    /// # Errors
    ///
    /// [`InvalidCapacity`](crate::LockfreeError::InvalidCapacity) if
    /// `capacity` is zero or the buffer size overflows, or
    /// [`AllocationFailed`](crate::LockfreeError::AllocationFailed).
    pub fn new(capacity: usize) -> LockfreeResult<Self> {
        Self::with_allocator(capacity, SystemAllocator)
    }

    /// Creates a queue sized by `config`.
    ///
    /// # Errors
    ///
    /// [`InvalidConfig`](crate::LockfreeError::InvalidConfig) for a bad
    /// config, otherwise as [`BoundedQueue::new`].
    pub fn from_config(config: &QueueConfig) -> LockfreeResult<Self> {
        config.validate()?;
        Self::new(config.capacity)
    }
}

impl<T, P: Cursor, C: Cursor, A: RawAllocator> BoundedQueue<T, P, C, A> {
    /// Creates a queue whose buffer comes from `allocator`.
    ///
    /// The buffer is allocated once here and released when the queue drops.
    ///
    /// # Errors
    ///
    /// As [`BoundedQueue::new`], plus any error from `allocator`.
    pub fn with_allocator(capacity: usize, allocator: A) -> LockfreeResult<Self> {
        let ring = RingStorage::new(capacity, allocator)?;
        tracing::debug!(
            capacity,
            element_size = mem::size_of::<T>(),
            "bounded queue created"
        );
        Ok(Self {
            tail: P::new(),
            head: C::new(),
            ring,
        })
    }

    /// Splits the queue into its producer and consumer handles.
    #[must_use]
    pub fn split(self) -> (Producer<T, P, C, A>, Consumer<T, P, C, A>) {
        let shared = Arc::new(self);
        (
            Producer {
                queue: Arc::clone(&shared),
            },
            Consumer { queue: shared },
        )
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Snapshot of the number of live elements. Exact only when no other
    /// thread is pushing or popping.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.public_index().load(Ordering::Acquire);
        let tail = self.tail.public_index().load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    /// Snapshot: true if no element is published.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Safety
    ///
    /// For a `Single` producer side, only one thread calls producer methods.
    unsafe fn push(&self, value: T) -> Result<(), T> {
        let space = free_slots(self.capacity());
        // SAFETY: exclusivity forwarded from the caller.
        let Some((start, _)) = (unsafe { self.tail.reserve(1, 1, self.head.public_index(), space) })
        else {
            return Err(value);
        };
        // SAFETY: slot `start` is reserved and empty.
        unsafe {
            self.ring.write(start, value);
            self.tail.publish(start, 1);
        }
        Ok(())
    }

    /// # Safety
    ///
    /// For a `Single` consumer side, only one thread calls consumer methods.
    unsafe fn pop(&self) -> Option<T> {
        let ready = ready_slots(self.capacity());
        // SAFETY: exclusivity forwarded from the caller.
        let (start, _) = unsafe { self.head.reserve(1, 1, self.tail.public_index(), ready) }?;
        // SAFETY: slot `start` is reserved and live.
        unsafe {
            let value = self.ring.read(start);
            self.head.publish(start, 1);
            Some(value)
        }
    }

    /// Moves between `min` and all of `items` from the front of the vector
    /// into the queue. Returns the count moved.
    ///
    /// # Safety
    ///
    /// As [`BoundedQueue::push`].
    unsafe fn push_from(&self, items: &mut Vec<T>, min: usize) -> usize {
        let len = items.len();
        let want = len.min(self.capacity());
        if want == 0 || min > want {
            return 0;
        }

        let space = free_slots(self.capacity());
        // SAFETY: exclusivity forwarded from the caller.
        let Some((start, count)) =
            (unsafe { self.tail.reserve(want, min, self.head.public_index(), space) })
        else {
            return 0;
        };

        // SAFETY: the run is reserved and empty. The first `count` values
        // move into the ring; the rest shift to the front of `items` before
        // the length is cut, so every value keeps exactly one owner.
        unsafe {
            let base = items.as_mut_ptr();
            self.ring.write_run(start, base, count);
            ptr::copy(base.add(count), base, len - count);
            items.set_len(len - count);
            self.tail.publish(start, count);
        }
        count
    }

    /// Appends between `min` and `max` elements to `out`. Returns the count.
    ///
    /// # Safety
    ///
    /// As [`BoundedQueue::pop`].
    unsafe fn pop_into(&self, out: &mut Vec<T>, max: usize, min: usize) -> usize {
        let want = max.min(self.capacity());
        if want == 0 || min > want {
            return 0;
        }

        // Grow before reserving: a panic must not strand a reservation.
        out.reserve(want);

        let ready = ready_slots(self.capacity());
        // SAFETY: exclusivity forwarded from the caller.
        let Some((start, count)) =
            (unsafe { self.head.reserve(want, min, self.tail.public_index(), ready) })
        else {
            return 0;
        };

        // SAFETY: the run is reserved and live; `out` has room for `want`.
        unsafe {
            let len = out.len();
            self.ring.read_run(start, out.as_mut_ptr().add(len), count);
            out.set_len(len + count);
            self.head.publish(start, count);
        }
        count
    }

    /// Drops every published element. Returns the count dropped.
    ///
    /// # Safety
    ///
    /// As [`BoundedQueue::pop`].
    unsafe fn clear(&self) -> usize {
        let capacity = self.capacity();
        let mut dropped = 0;
        loop {
            // SAFETY: exclusivity forwarded from the caller.
            let reserved = unsafe {
                self.head
                    .reserve(capacity, 1, self.tail.public_index(), ready_slots(capacity))
            };
            let Some((start, count)) = reserved else {
                return dropped;
            };
            // SAFETY: the run is reserved and live.
            unsafe {
                self.ring.drop_run(start, count);
                self.head.publish(start, count);
            }
            dropped += count;
        }
    }
}

impl<T, P: Cursor, C: Cursor, A: RawAllocator> Drop for BoundedQueue<T, P, C, A> {
    fn drop(&mut self) {
        let head = self.head.public_index().load(Ordering::Acquire);
        let tail = self.tail.public_index().load(Ordering::Acquire);
        let live = tail.wrapping_sub(head);
        if live == 0 {
            return;
        }
        // SAFETY: `&mut self`, no handle is left; `[head, tail)` is live.
        unsafe { self.ring.drop_run(head, live) };
        tracing::debug!(live, "bounded queue dropped with live elements");
    }
}

/// Write end of a [`BoundedQueue`].
///
/// `Clone` only when the producer side is [`Multi`].
pub struct Producer<T, P: Cursor, C: Cursor, A: RawAllocator = SystemAllocator> {
    queue: Arc<BoundedQueue<T, P, C, A>>,
}

impl<T, P: Cursor, C: Cursor, A: RawAllocator> Producer<T, P, C, A> {
    /// Pushes one value, or hands it back if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when all slots are taken. Nothing changes.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), T> {
        // SAFETY: a single-side handle is unique and `&mut self` serialises it.
        unsafe { self.queue.push(value) }
    }

    /// Moves every element of `items` into the queue, or none of them.
    ///
    /// On success `items` is left empty. An empty `items` succeeds; more
    /// items than the capacity always fail.
    pub fn try_push_range(&mut self, items: &mut Vec<T>) -> bool {
        let len = items.len();
        if len == 0 {
            return true;
        }
        if len > self.queue.capacity() {
            return false;
        }
        // SAFETY: as `push`.
        unsafe { self.queue.push_from(items, len) == len }
    }

    /// Moves as many elements as fit from the front of `items`, keeping
    /// their order. The rest stay in `items`. Returns the count moved.
    pub fn push_range(&mut self, items: &mut Vec<T>) -> usize {
        // SAFETY: as `push`.
        unsafe { self.queue.push_from(items, 1) }
    }

    /// Snapshot of the number of live elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot: true if no element is published.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl<T, C: Cursor, A: RawAllocator> Clone for Producer<T, Multi, C, A> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Read end of a [`BoundedQueue`].
///
/// `Clone` only when the consumer side is [`Multi`].
pub struct Consumer<T, P: Cursor, C: Cursor, A: RawAllocator = SystemAllocator> {
    queue: Arc<BoundedQueue<T, P, C, A>>,
}

impl<T, P: Cursor, C: Cursor, A: RawAllocator> Consumer<T, P, C, A> {
    /// Pops the oldest available value, or `None` if the queue is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: a single-side handle is unique and `&mut self` serialises it.
        unsafe { self.queue.pop() }
    }

    /// Appends exactly `count` values to `out`, or none.
    ///
    /// A zero `count` succeeds; more than the capacity always fails.
    pub fn try_pop_range(&mut self, out: &mut Vec<T>, count: usize) -> bool {
        if count == 0 {
            return true;
        }
        if count > self.queue.capacity() {
            return false;
        }
        // SAFETY: as `pop`.
        unsafe { self.queue.pop_into(out, count, count) == count }
    }

    /// Appends up to `max` values to `out`. Returns the count appended.
    pub fn pop_range(&mut self, out: &mut Vec<T>, max: usize) -> usize {
        // SAFETY: as `pop`.
        unsafe { self.queue.pop_into(out, max, 1) }
    }

    /// Pops and drops everything currently published. Returns the count.
    pub fn clear(&mut self) -> usize {
        // SAFETY: as `pop`.
        unsafe { self.queue.clear() }
    }

    /// Snapshot of the number of live elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot: true if no element is published.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl<T, P: Cursor, A: RawAllocator> Clone for Consumer<T, P, Multi, A> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockfreeError;
    use crate::memory::SafeAllocator;
    use std::sync::atomic::AtomicUsize;

    /// Counts drops through a shared counter.
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_zero_capacity_is_an_error() {
        let result = SpscQueue::<u32>::new(0);
        assert!(matches!(
            result,
            Err(LockfreeError::InvalidCapacity { requested: 0 })
        ));
    }

    #[test]
    fn test_from_config() {
        let queue = MpmcQueue::<u32>::from_config(&QueueConfig { capacity: 32 }).unwrap();
        assert_eq!(queue.capacity(), 32);
        assert!(queue.is_empty());

        let bad = MpmcQueue::<u32>::from_config(&QueueConfig { capacity: 0 });
        assert!(matches!(bad, Err(LockfreeError::InvalidConfig(_))));
    }

    #[test]
    fn test_drop_drains_live_elements_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let (mut tx, mut rx) = MpmcQueue::new(4).unwrap().split();
            for _ in 0..4 {
                assert!(tx.push(Tracked(Arc::clone(&drops))).is_ok());
            }
            drop(rx.pop());
            assert_eq!(drops.load(Ordering::SeqCst), 1);
            // Wrap the ring so the live run spans the end of the buffer.
            assert!(tx.push(Tracked(Arc::clone(&drops))).is_ok());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_clear_drops_everything() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (mut tx, mut rx) = SpmcQueue::new(8).unwrap().split();
        for _ in 0..6 {
            assert!(tx.push(Tracked(Arc::clone(&drops))).is_ok());
        }
        assert_eq!(rx.clear(), 6);
        assert_eq!(drops.load(Ordering::SeqCst), 6);
        assert!(rx.is_empty());
        assert_eq!(rx.clear(), 0);
    }

    #[test]
    fn test_queue_on_safe_allocator() {
        let allocator = Arc::new(SafeAllocator::<4, 16, 24>::new());
        {
            let queue =
                SpscQueue::<u64, _>::with_allocator(100, Arc::clone(&allocator)).unwrap();
            let (mut tx, mut rx) = queue.split();
            for i in 0..100 {
                assert!(tx.push(i).is_ok());
            }
            assert_eq!(tx.push(100), Err(100));
            assert_eq!(rx.pop(), Some(0));
        }
        // The buffer went back to its bucket.
        assert!(!allocator.empty());
        assert_eq!(allocator.stats().slabs_created, 1);
    }

    #[test]
    fn test_free_and_ready_slots() {
        let free = free_slots(4);
        assert_eq!(free(0, 0), Some(4));
        assert_eq!(free(6, 3), Some(1));
        assert_eq!(free(7, 3), Some(0));
        assert_eq!(free(2, 3), None);
        assert_eq!(free(1, usize::MAX), Some(2));

        let ready = ready_slots(4);
        assert_eq!(ready(3, 3), Some(0));
        assert_eq!(ready(3, 7), Some(4));
        assert_eq!(ready(usize::MAX, 1), Some(2));
        assert_eq!(ready(5, 3), None);
    }

    #[test]
    fn test_zero_sized_elements() {
        let (mut tx, mut rx) = MpscQueue::<()>::new(3).unwrap().split();
        assert!(tx.push(()).is_ok());
        assert!(tx.push(()).is_ok());
        assert!(tx.push(()).is_ok());
        assert_eq!(tx.push(()), Err(()));
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.pop(), Some(()));
        assert!(tx.push(()).is_ok());
    }
}
