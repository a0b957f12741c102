//! # Ring Storage
//!
//! Fixed block of `capacity` uninitialised slots. Index `i` lives in slot
//! `i % capacity`; indices are free-running counters owned by the cursors.
//!
//! ```text
//! index:   ... 6   7   8   9  10  11 ...
//! slot:        2   3   0   1   2   3          capacity = 4
//!                      └── a run that wraps is two copies ──┘
//! ```
//!
//! The storage never knows which slots are live. Callers hold the
//! reservation that makes each access exclusive.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::error::{LockfreeError, LockfreeResult};
use crate::memory::RawAllocator;

/// Slot arena of a bounded queue.
pub(crate) struct RingStorage<T, A: RawAllocator> {
    slots: NonNull<T>,
    capacity: usize,
    layout: Layout,
    allocator: A,
    _owns: PhantomData<T>,
}

impl<T, A: RawAllocator> RingStorage<T, A> {
    /// Allocates `capacity` slots through `allocator`.
    pub(crate) fn new(capacity: usize, allocator: A) -> LockfreeResult<Self> {
        if capacity == 0 {
            return Err(LockfreeError::InvalidCapacity { requested: capacity });
        }
        let layout = Layout::array::<T>(capacity)
            .map_err(|_| LockfreeError::InvalidCapacity { requested: capacity })?;

        let slots = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            allocator.allocate(layout.size(), layout.align())?.cast::<T>()
        };

        Ok(Self {
            slots,
            capacity,
            layout,
            allocator,
            _owns: PhantomData,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pointer to the slot holding `index`.
    #[inline]
    fn slot(&self, index: usize) -> *mut T {
        // SAFETY: `index % capacity` is in bounds of the slot array.
        unsafe { self.slots.as_ptr().add(index % self.capacity) }
    }

    /// Splits `count` positions from `start` into the run before the end of
    /// the array and the run that wraps to slot zero.
    #[inline]
    fn split(&self, start: usize, count: usize) -> (usize, usize) {
        let offset = start % self.capacity;
        let first = count.min(self.capacity - offset);
        (first, count - first)
    }

    /// Moves `value` into the slot of `index`.
    ///
    /// # Safety
    ///
    /// The caller holds the reservation for `index` and the slot is empty.
    #[inline]
    pub(crate) unsafe fn write(&self, index: usize, value: T) {
        // SAFETY: forwarded from the caller.
        unsafe { self.slot(index).write(value) };
    }

    /// Moves the value out of the slot of `index`.
    ///
    /// # Safety
    ///
    /// The caller holds the reservation for `index` and the slot is live.
    #[inline]
    pub(crate) unsafe fn read(&self, index: usize) -> T {
        // SAFETY: forwarded from the caller.
        unsafe { self.slot(index).read() }
    }

    /// Copies `count` values from `src` into the slots starting at `start`.
    ///
    /// # Safety
    ///
    /// The caller holds the reservation for the whole run, the slots are
    /// empty, `count <= capacity`, and ownership of the `count` values at
    /// `src` moves into the ring.
    pub(crate) unsafe fn write_run(&self, start: usize, src: *const T, count: usize) {
        let (first, second) = self.split(start, count);
        // SAFETY: both runs are in bounds and disjoint from `src`.
        unsafe {
            ptr::copy_nonoverlapping(src, self.slot(start), first);
            ptr::copy_nonoverlapping(src.add(first), self.slots.as_ptr(), second);
        }
    }

    /// Copies `count` values out of the slots starting at `start` into `dst`.
    ///
    /// # Safety
    ///
    /// The caller holds the reservation for the whole run, the slots are
    /// live, `count <= capacity`, `dst` has room for `count` values, and
    /// ownership moves out of the ring.
    pub(crate) unsafe fn read_run(&self, start: usize, dst: *mut T, count: usize) {
        let (first, second) = self.split(start, count);
        // SAFETY: both runs are in bounds and disjoint from `dst`.
        unsafe {
            ptr::copy_nonoverlapping(self.slot(start), dst, first);
            ptr::copy_nonoverlapping(self.slots.as_ptr(), dst.add(first), second);
        }
    }

    /// Drops the values in `count` slots starting at `start`.
    ///
    /// # Safety
    ///
    /// The slots are live and no one else can reach them.
    pub(crate) unsafe fn drop_run(&self, start: usize, count: usize) {
        let (first, second) = self.split(start, count);
        // SAFETY: both runs are in bounds and hold initialised values.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.slot(start), first));
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.slots.as_ptr(), second));
        }
    }
}

impl<T, A: RawAllocator> Drop for RingStorage<T, A> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `new` through the same allocator and layout.
            unsafe {
                self.allocator.deallocate(
                    self.slots.cast::<u8>(),
                    self.layout.size(),
                    self.layout.align(),
                );
            }
        }
    }
}
