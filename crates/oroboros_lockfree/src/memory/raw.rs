//! # Raw Allocator Contract
//!
//! The capability every backing store must provide: hand out and take back
//! untyped, aligned bytes. Queues take one of these at construction instead
//! of reaching for a global.

#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{LockfreeError, LockfreeResult};

/// Source of raw, aligned memory blocks.
///
/// Implementations must be usable from any thread.
pub trait RawAllocator: Send + Sync {
    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// Zero-sized requests are legal and return a unique, non-null block.
    ///
    /// # Errors
    ///
    /// [`LockfreeError::InvalidLayout`] if `alignment` is not a power of two,
    /// [`LockfreeError::AllocationFailed`] if the memory cannot be provided.
    fn allocate(&self, size: usize, alignment: usize) -> LockfreeResult<NonNull<u8>>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`RawAllocator::allocate`] on this allocator with
    /// the same `size` and `alignment`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize);
}

impl<A: RawAllocator + ?Sized> RawAllocator for Arc<A> {
    #[inline]
    fn allocate(&self, size: usize, alignment: usize) -> LockfreeResult<NonNull<u8>> {
        (**self).allocate(size, alignment)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).deallocate(ptr, size, alignment) }
    }
}

/// The process allocator (`std::alloc`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    fn layout(size: usize, alignment: usize) -> LockfreeResult<Layout> {
        // Zero-byte requests get one byte so every block is a real allocation.
        Layout::from_size_align(size.max(1), alignment)
            .map_err(|_| LockfreeError::InvalidLayout { size, alignment })
    }
}

impl RawAllocator for SystemAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> LockfreeResult<NonNull<u8>> {
        let layout = Self::layout(size, alignment)?;
        // SAFETY: layout size is non-zero.
        let raw = unsafe { alloc(layout) };
        NonNull::new(raw).ok_or(LockfreeError::AllocationFailed { size, alignment })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        let layout = Self::layout(size, alignment);
        debug_assert!(
            layout.is_ok(),
            "deallocate with a layout that allocate would reject: size {size}, alignment {alignment}"
        );
        // The layout was valid when the block was handed out.
        if let Ok(layout) = layout {
            // SAFETY: caller guarantees `ptr` came from `allocate` with this layout.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}
