//! # Atomic Bucket
//!
//! Free list of raw, same-sized blocks. A free block stores its [`Link`] in
//! its own first bytes, so the list costs no memory beyond the blocks.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use super::stack::{AtomicStack, Link};

/// Lock-free free list of raw memory blocks.
#[derive(Default)]
pub struct AtomicBucket {
    blocks: AtomicStack<Link>,
}

impl AtomicBucket {
    /// Smallest block a bucket can hold.
    pub const MIN_BLOCK_SIZE: usize = std::mem::size_of::<Link>();

    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: AtomicStack::new(),
        }
    }

    /// Returns true if the bucket holds no block. Racy under concurrent use.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns `block` to the free list.
    ///
    /// # Safety
    ///
    /// `block` must be at least [`Self::MIN_BLOCK_SIZE`] bytes, aligned for a
    /// pointer, owned by the caller, and stay mapped while the bucket lives.
    #[inline]
    pub unsafe fn push(&self, block: NonNull<u8>) {
        // SAFETY: forwarded from the caller.
        unsafe { self.blocks.push(block.cast::<Link>()) };
    }

    /// Takes a block off the free list.
    #[inline]
    pub fn pop(&self) -> Option<NonNull<u8>> {
        self.blocks.pop().map(NonNull::cast)
    }
}
