//! # Slabs
//!
//! A slab ("stack") is one system allocation consumed by bumping a head
//! offset. Its header lives in its own first bytes:
//!
//! ```text
//! base
//! ┌────────────┬─────────┬───────────────┬─────────────────────────┐
//! │ Slab hdr   │ padding │ carved blocks │ free (head .. size)     │
//! └────────────┴─────────┴───────────────┴─────────────────────────┘
//! ```
//!
//! A slab is exclusively owned by whichever thread popped it off the
//! allocator's active list, so `head` needs no atomics.

#![allow(unsafe_code)]

use std::mem::size_of;
use std::ops::Range;
use std::ptr::NonNull;

use crate::error::LockfreeResult;
use crate::memory::raw::{RawAllocator, SystemAllocator};
use crate::sync::{Intrusive, Link};

/// Header of a bump-allocated slab.
#[repr(C)]
pub(crate) struct Slab {
    /// Active/busy list linkage; only touched through pointer casts.
    #[allow(dead_code)]
    link: Link,
    size: usize,
    head: usize,
}

// SAFETY: repr(C), link first.
unsafe impl Intrusive for Slab {}

/// Result of carving one block out of a slab.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Carve {
    /// Bytes skipped to reach the block's alignment.
    pub(crate) padding: Range<usize>,
    /// Offset of the block from the slab base.
    pub(crate) offset: usize,
}

impl Slab {
    /// Bytes taken by the header at the start of every slab.
    pub(crate) const HEADER_LEN: usize = size_of::<Self>();

    /// Smallest slab that can serve one block of `class_size` bytes.
    pub(crate) fn min_size_for(class_size: usize) -> usize {
        Self::HEADER_LEN.next_multiple_of(class_size) + class_size
    }

    /// Allocates a fresh slab of `size` bytes aligned to `alignment`.
    pub(crate) fn create(size: usize, alignment: usize) -> LockfreeResult<NonNull<Self>> {
        debug_assert!(size >= Self::HEADER_LEN);
        let base = SystemAllocator.allocate(size, alignment)?;
        let slab = base.cast::<Self>();
        // SAFETY: fresh allocation, at least HEADER_LEN bytes, aligned beyond Slab.
        unsafe {
            slab.as_ptr().write(Self {
                link: Link::new(),
                size,
                head: Self::HEADER_LEN,
            });
        }
        Ok(slab)
    }

    /// Returns a slab's memory to the system.
    ///
    /// # Safety
    ///
    /// `slab` came from [`Slab::create`] with the same `alignment`, is on no
    /// list, and no block carved from it is used again.
    pub(crate) unsafe fn destroy(slab: NonNull<Self>, alignment: usize) {
        // SAFETY: header is initialised for every created slab.
        let size = unsafe { (*slab.as_ptr()).size };
        // SAFETY: same size and alignment as `create`.
        unsafe { SystemAllocator.deallocate(slab.cast(), size, alignment) };
    }

    /// Total size of the slab in bytes.
    ///
    /// # Safety
    ///
    /// `slab` is a live slab owned by the caller.
    pub(crate) unsafe fn size(slab: NonNull<Self>) -> usize {
        // SAFETY: forwarded from the caller.
        unsafe { (*slab.as_ptr()).size }
    }

    /// Bytes left after the bump head.
    ///
    /// # Safety
    ///
    /// `slab` is a live slab owned by the caller.
    pub(crate) unsafe fn remaining(slab: NonNull<Self>) -> usize {
        // SAFETY: forwarded from the caller.
        unsafe { (*slab.as_ptr()).size - (*slab.as_ptr()).head }
    }

    /// Carves a `class_size` block aligned to `class_size`.
    ///
    /// Returns `None` without touching the slab if the block does not fit.
    ///
    /// # Safety
    ///
    /// `slab` is a live slab owned by the caller.
    pub(crate) unsafe fn bump(slab: NonNull<Self>, class_size: usize) -> Option<Carve> {
        let header = slab.as_ptr();
        // SAFETY: forwarded from the caller.
        let (head, size) = unsafe { ((*header).head, (*header).size) };

        let offset = head.checked_next_multiple_of(class_size)?;
        let end = offset.checked_add(class_size)?;
        if end > size {
            return None;
        }

        // SAFETY: exclusive owner.
        unsafe { (*header).head = end };
        Some(Carve {
            padding: head..offset,
            offset,
        })
    }

    /// Marks the rest of the slab as used and returns the range it covered.
    ///
    /// # Safety
    ///
    /// `slab` is a live slab owned by the caller.
    pub(crate) unsafe fn retire(slab: NonNull<Self>) -> Range<usize> {
        let header = slab.as_ptr();
        // SAFETY: exclusive owner.
        unsafe {
            let tail = (*header).head..(*header).size;
            (*header).head = (*header).size;
            tail
        }
    }

    /// Pointer to the byte at `offset` from the slab base.
    ///
    /// # Safety
    ///
    /// `offset` is within the slab.
    pub(crate) unsafe fn at(slab: NonNull<Self>, offset: usize) -> NonNull<u8> {
        // SAFETY: in-bounds offset of a live allocation is non-null.
        unsafe { NonNull::new_unchecked(slab.cast::<u8>().as_ptr().add(offset)) }
    }
}
