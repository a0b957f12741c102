//! # Tagged Pointers
//!
//! An `(address, generation)` pair swapped as one 128-bit word.
//!
//! ```text
//!  127              64 63               0
//! ┌──────────────────┬──────────────────┐
//! │    generation    │     address      │
//! └──────────────────┴──────────────────┘
//! ```
//!
//! Every successful update of a list head bumps the generation, so a head
//! value captured before a pop/push cycle recycled the same address can
//! never win a later compare-exchange.

use portable_atomic::AtomicU128;
use std::sync::atomic::Ordering;

/// A pointer paired with a generation counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaggedPtr {
    addr: usize,
    tag: u64,
}

impl TaggedPtr {
    /// Null pointer at generation zero.
    pub const NULL: Self = Self { addr: 0, tag: 0 };

    /// Pairs `ptr` with generation `tag`.
    #[inline]
    #[must_use]
    pub fn new<T>(ptr: *mut T, tag: u64) -> Self {
        Self {
            addr: ptr as usize,
            tag,
        }
    }

    /// Returns the address as a typed pointer.
    #[inline]
    #[must_use]
    pub fn as_ptr<T>(self) -> *mut T {
        self.addr as *mut T
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u64 {
        self.tag
    }

    /// Returns true if the address is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// Points at `ptr` with the next generation.
    #[inline]
    #[must_use]
    pub fn successor<T>(self, ptr: *mut T) -> Self {
        Self::new(ptr, self.tag.wrapping_add(1))
    }

    #[inline]
    fn pack(self) -> u128 {
        (u128::from(self.tag) << 64) | self.addr as u128
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn unpack(word: u128) -> Self {
        Self {
            addr: word as u64 as usize,
            tag: (word >> 64) as u64,
        }
    }
}

/// Atomic cell holding a [`TaggedPtr`].
#[derive(Debug)]
pub struct AtomicTaggedPtr {
    word: AtomicU128,
}

impl AtomicTaggedPtr {
    /// Creates a cell holding `value`.
    #[must_use]
    pub fn new(value: TaggedPtr) -> Self {
        Self {
            word: AtomicU128::new(value.pack()),
        }
    }

    /// Loads the current value.
    #[inline]
    #[must_use]
    pub fn load(&self, order: Ordering) -> TaggedPtr {
        TaggedPtr::unpack(self.word.load(order))
    }

    /// Replaces `current` with `new` if both address and generation match.
    ///
    /// May fail spuriously; callers retry in a loop.
    ///
    /// # Errors
    ///
    /// Returns the value actually observed when the exchange fails.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TaggedPtr,
        new: TaggedPtr,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr, TaggedPtr> {
        self.word
            .compare_exchange_weak(current.pack(), new.pack(), success, failure)
            .map(TaggedPtr::unpack)
            .map_err(TaggedPtr::unpack)
    }

    /// Replaces `current` with `new` if both address and generation match.
    ///
    /// # Errors
    ///
    /// Returns the value actually observed when the exchange fails.
    pub fn compare_exchange(
        &self,
        current: TaggedPtr,
        new: TaggedPtr,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr, TaggedPtr> {
        self.word
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(TaggedPtr::unpack)
            .map_err(TaggedPtr::unpack)
    }
}

impl Default for AtomicTaggedPtr {
    fn default() -> Self {
        Self::new(TaggedPtr::NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip_keeps_both_halves() {
        let mut value = 7u32;
        let ptr: *mut u32 = &mut value;
        let tagged = TaggedPtr::new(ptr, u64::MAX - 1);

        let cell = AtomicTaggedPtr::new(tagged);
        let loaded = cell.load(Ordering::Acquire);
        assert_eq!(loaded, tagged);
        assert_eq!(loaded.as_ptr::<u32>(), ptr);
        assert_eq!(loaded.tag(), u64::MAX - 1);
    }

    #[test]
    fn test_stale_generation_loses_cas() {
        let mut slot = 0u64;
        let ptr: *mut u64 = &mut slot;

        let cell = AtomicTaggedPtr::new(TaggedPtr::new(ptr, 1));
        let stale = cell.load(Ordering::Acquire);

        // Same address comes back with a newer generation (pop, then push).
        let popped = stale.successor(std::ptr::null_mut::<u64>());
        cell.compare_exchange(stale, popped, Ordering::AcqRel, Ordering::Acquire)
            .unwrap();
        let pushed = popped.successor(ptr);
        cell.compare_exchange(popped, pushed, Ordering::AcqRel, Ordering::Acquire)
            .unwrap();

        // Address matches, generation does not.
        assert_eq!(stale.as_ptr::<u64>(), pushed.as_ptr::<u64>());
        let result = cell.compare_exchange(
            stale,
            TaggedPtr::NULL,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert_eq!(result, Err(pushed));
    }

    #[test]
    fn test_null_and_successor() {
        assert!(TaggedPtr::NULL.is_null());
        let next = TaggedPtr::NULL.successor(std::ptr::null_mut::<u8>());
        assert!(next.is_null());
        assert_eq!(next.tag(), 1);
    }
}
