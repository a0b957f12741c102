//! # Atomic Stack
//!
//! Intrusive Treiber stack whose head is a [`TaggedPtr`]. Nodes embed a
//! [`Link`] as their first field; the stack never allocates.
//!
//! ## Reclamation
//!
//! A popper reads `next` out of the node it saw at the head before its CAS.
//! That node may already have been popped by someone else, so node memory
//! must stay mapped for as long as the stack is in use. The allocator
//! guarantees this by returning slabs to the system only on drop.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use super::tagged::{AtomicTaggedPtr, TaggedPtr};

/// Intrusive link stored in the first bytes of every node.
#[derive(Debug)]
#[repr(C)]
pub struct Link {
    next: AtomicPtr<Link>,
}

impl Link {
    /// An unlinked node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

/// Node types that can live on an [`AtomicStack`].
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`Link`] as their first field,
/// so a node pointer and its link pointer are the same address.
pub unsafe trait Intrusive {}

// SAFETY: a bare link is its own first field.
unsafe impl Intrusive for Link {}

/// Lock-free LIFO list of intrusive nodes.
pub struct AtomicStack<N: Intrusive> {
    head: AtomicTaggedPtr,
    _marker: PhantomData<*mut N>,
}

// SAFETY: the stack only moves raw node addresses between threads; node
// ownership is transferred by a successful CAS on the tagged head.
unsafe impl<N: Intrusive> Send for AtomicStack<N> {}
// SAFETY: all shared state is the atomic head.
unsafe impl<N: Intrusive> Sync for AtomicStack<N> {}

impl<N: Intrusive> AtomicStack<N> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicTaggedPtr::new(TaggedPtr::NULL),
            _marker: PhantomData,
        }
    }

    /// Returns true if no node is linked. Racy under concurrent use.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Pushes `node` on top of the stack.
    ///
    /// # Safety
    ///
    /// `node` must point to writable memory large enough for `N`, must not
    /// currently be linked on any stack, and must stay mapped while any
    /// stack it passes through is in use.
    pub unsafe fn push(&self, node: NonNull<N>) {
        let link = node.cast::<Link>().as_ptr();
        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is not published yet, the caller owns it. The
            // store is atomic because a stale popper may still be reading it.
            unsafe { (*link).next.store(current.as_ptr(), Ordering::Relaxed) };
            match self.head.compare_exchange_weak(
                current,
                current.successor(link),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Pops the top node, or `None` if the stack is empty.
    ///
    /// The returned node is exclusively owned by the caller.
    pub fn pop(&self) -> Option<NonNull<N>> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let link = NonNull::new(current.as_ptr::<Link>())?;
            // SAFETY: node memory stays mapped until the owning allocator is
            // dropped, so the load never faults. If another thread popped the
            // node and is now writing the block with plain stores, this load
            // races with them. That race is the accepted cost of a tagged
            // Treiber stack without deferred reclamation: the value read is
            // discarded because the generation check below fails.
            let next = unsafe { link.as_ref().next.load(Ordering::Relaxed) };
            match self.head.compare_exchange_weak(
                current,
                current.successor(next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(link.cast()),
                Err(actual) => current = actual,
            }
        }
    }
}

impl<N: Intrusive> Default for AtomicStack<N> {
    fn default() -> Self {
        Self::new()
    }
}
