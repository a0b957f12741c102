//! # Safe Allocator
//!
//! Thread-safe, size-classed allocator: one lock-free bucket per power-of-two
//! class, refilled from bump-allocated slabs.
//!
//! ## Allocation Path
//!
//! ```text
//! allocate(size, align)
//!   │
//!   ├─ max(size, align) > MAX_SIZE ──────────────▶ system allocator
//!   │
//!   ├─ bucket[class].pop() ── hit ───────────────▶ block          O(1)
//!   │
//!   └─ miss: pop active slab (or create one)
//!        bump block aligned to its class
//!        padding + unusable tail ─▶ fragment into buckets
//!        slab has room ? active list : busy list
//! ```
//!
//! Every block in a bucket is aligned to its own class size, so a recycled
//! block serves any alignment up to that size.
//!
//! Memory is never returned to the system before the allocator is dropped.
//! That is what keeps the tagged free lists safe to walk.

#![allow(unsafe_code)]

use std::ops::Range;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::config::AllocatorConfig;
use crate::error::{LockfreeError, LockfreeResult};
use crate::memory::raw::{RawAllocator, SystemAllocator};
use crate::memory::size_class::SizeClasses;
use crate::memory::slab::Slab;
use crate::sync::{AtomicBucket, AtomicStack};

/// Allocation counters, snapshot of [`SafeAllocator::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Slabs obtained from the system.
    pub slabs_created: u64,
    /// Total bytes held in slabs.
    pub bytes_reserved: u64,
    /// Requests served straight from a bucket.
    pub bucket_hits: u64,
    /// Requests that had to carve from a slab.
    pub bucket_misses: u64,
    /// Requests above the retained range, forwarded to the system.
    pub system_fallbacks: u64,
    /// Leftover pieces pushed into buckets instead of being wasted.
    pub fragments_recycled: u64,
}

#[derive(Default)]
struct StatCounters {
    slabs_created: AtomicU64,
    bytes_reserved: AtomicU64,
    bucket_hits: AtomicU64,
    bucket_misses: AtomicU64,
    system_fallbacks: AtomicU64,
    fragments_recycled: AtomicU64,
}

impl StatCounters {
    #[inline]
    fn bump(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            slabs_created: self.slabs_created.load(Ordering::Relaxed),
            bytes_reserved: self.bytes_reserved.load(Ordering::Relaxed),
            bucket_hits: self.bucket_hits.load(Ordering::Relaxed),
            bucket_misses: self.bucket_misses.load(Ordering::Relaxed),
            system_fallbacks: self.system_fallbacks.load(Ordering::Relaxed),
            fragments_recycled: self.fragments_recycled.load(Ordering::Relaxed),
        }
    }
}

/// Size-classed bucket allocator backed by bump slabs.
///
/// # Type Parameters
///
/// * `MIN_SIZE_POWER` - smallest class is `2^MIN_SIZE_POWER` bytes
/// * `MAX_SIZE_POWER` - largest retained class; bigger requests go to the system
/// * `MAX_STACK_SIZE_POWER` - upper bound on a single slab
///
/// # Thread Safety
///
/// All methods take `&self` and are lock-free. Share it through an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// let allocator = SafeAllocator::<4, 16, 24>::new();
///
/// let block = allocator.allocate(48, 16)?;      // served by the 64-byte class
/// unsafe { allocator.deallocate(block, 48, 16) };
///
/// let again = allocator.allocate(60, 8)?;       // same block, from the bucket
/// ```
pub struct SafeAllocator<
    const MIN_SIZE_POWER: u32 = 4,
    const MAX_SIZE_POWER: u32 = 16,
    const MAX_STACK_SIZE_POWER: u32 = 24,
> {
    /// One free list per size class.
    buckets: Box<[CachePadded<AtomicBucket>]>,
    /// Slabs with free space left.
    active: AtomicStack<Slab>,
    /// Exhausted slabs, kept for teardown.
    busy: AtomicStack<Slab>,
    /// Largest slab created so far; drives the growth heuristic.
    largest_stack_size: AtomicUsize,
    config: AllocatorConfig,
    stats: StatCounters,
}

impl<const MIN_SIZE_POWER: u32, const MAX_SIZE_POWER: u32, const MAX_STACK_SIZE_POWER: u32>
    SafeAllocator<MIN_SIZE_POWER, MAX_SIZE_POWER, MAX_STACK_SIZE_POWER>
{
    /// Class table for this instantiation.
    pub const CLASSES: SizeClasses = SizeClasses::new(MIN_SIZE_POWER, MAX_SIZE_POWER);

    /// Largest request served from buckets.
    pub const MAX_SIZE: usize = 1 << MAX_SIZE_POWER;

    /// Largest slab the growth heuristic will ask for.
    pub const MAX_STACK_SIZE: usize = 1 << MAX_STACK_SIZE_POWER;

    /// Slabs are aligned to the largest class so offsets and addresses share
    /// alignment for every class.
    const SLAB_ALIGN: usize = Self::MAX_SIZE;

    const BOUNDS_OK: () = {
        assert!(
            (1usize << MIN_SIZE_POWER) >= AtomicBucket::MIN_BLOCK_SIZE,
            "smallest class cannot hold a free-list link"
        );
        assert!(
            MAX_STACK_SIZE_POWER > MAX_SIZE_POWER,
            "a slab must be larger than the largest class"
        );
        assert!(MAX_STACK_SIZE_POWER < usize::BITS, "slab size overflows usize");
    };

    /// Creates an allocator with the default sizing policy.
    ///
    /// No memory is reserved until the first allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::build(AllocatorConfig::default())
    }

    /// Creates an allocator with a custom sizing policy.
    ///
    /// # Errors
    ///
    /// Returns [`LockfreeError::InvalidConfig`] if the policy is invalid.
    pub fn with_config(config: AllocatorConfig) -> LockfreeResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AllocatorConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::BOUNDS_OK;

        let buckets = (0..Self::CLASSES.count())
            .map(|_| CachePadded::new(AtomicBucket::new()))
            .collect();

        Self {
            buckets,
            active: AtomicStack::new(),
            busy: AtomicStack::new(),
            largest_stack_size: AtomicUsize::new(0),
            config,
            stats: StatCounters::default(),
        }
    }

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// Requests up to [`Self::MAX_SIZE`] are served from the matching bucket
    /// or carved from a slab; larger ones go straight to the system.
    /// Zero-byte requests get a block of the smallest class.
    ///
    /// # Errors
    ///
    /// [`LockfreeError::InvalidLayout`] if `alignment` is not a power of two,
    /// [`LockfreeError::AllocationFailed`] if the system refuses a new slab.
    pub fn allocate(&self, size: usize, alignment: usize) -> LockfreeResult<NonNull<u8>> {
        if !alignment.is_power_of_two() {
            return Err(LockfreeError::InvalidLayout { size, alignment });
        }

        let target = size.max(alignment);
        let Some(index) = Self::CLASSES.index_for(target) else {
            StatCounters::bump(&self.stats.system_fallbacks, 1);
            tracing::trace!(size, alignment, "above retained range, using system allocator");
            return SystemAllocator.allocate(size, alignment);
        };

        if let Some(block) = self.buckets[index].pop() {
            StatCounters::bump(&self.stats.bucket_hits, 1);
            return Ok(block);
        }

        StatCounters::bump(&self.stats.bucket_misses, 1);
        self.carve(index)
    }

    /// Returns a block to its bucket, or to the system if it was too large.
    ///
    /// # Safety
    ///
    /// `ptr` came from [`SafeAllocator::allocate`] on this allocator with the
    /// same `size` and `alignment`, and is not used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        let target = size.max(alignment);
        match Self::CLASSES.index_for(target) {
            // SAFETY: the block is class-sized and class-aligned, at least one link wide.
            Some(index) => unsafe { self.buckets[index].push(ptr) },
            // SAFETY: the block came from the system fallback with this layout.
            None => unsafe { SystemAllocator.deallocate(ptr, size, alignment) },
        }
    }

    /// Returns true iff every bucket free list is empty. Racy under
    /// concurrent use; meant for debugging and tests.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    /// Snapshot of the allocation counters.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    /// Carves a fresh block of class `index` out of a slab.
    fn carve(&self, index: usize) -> LockfreeResult<NonNull<u8>> {
        let class_size = Self::CLASSES.class_size(index);

        loop {
            let slab = match self.active.pop() {
                Some(slab) => slab,
                None => self.create_slab(class_size)?,
            };

            // SAFETY: the slab was popped or just created; this thread owns it
            // until it is pushed onto a list again.
            unsafe {
                let Some(carve) = Slab::bump(slab, class_size) else {
                    // Too small for this class; keep what is left as fragments.
                    let tail = Slab::retire(slab);
                    self.recycle(slab, tail);
                    self.busy.push(slab);
                    continue;
                };

                self.recycle(slab, carve.padding);

                if Slab::remaining(slab) < class_size {
                    let tail = Slab::retire(slab);
                    self.recycle(slab, tail);
                    self.busy.push(slab);
                } else {
                    self.active.push(slab);
                }

                return Ok(Slab::at(slab, carve.offset));
            }
        }
    }

    /// Obtains a new slab from the system, sized by the growth heuristic.
    fn create_slab(&self, class_size: usize) -> LockfreeResult<NonNull<Slab>> {
        let largest = self.largest_stack_size.load(Ordering::Relaxed);
        let grown = largest.saturating_mul(self.config.stack_growth_factor);
        let size = self
            .config
            .initial_stack_size
            .max(grown)
            .min(Self::MAX_STACK_SIZE)
            .max(Slab::min_size_for(class_size))
            .next_power_of_two();

        let slab = Slab::create(size, Self::SLAB_ALIGN)?;
        self.largest_stack_size.fetch_max(size, Ordering::Relaxed);
        StatCounters::bump(&self.stats.slabs_created, 1);
        StatCounters::bump(&self.stats.bytes_reserved, size as u64);
        tracing::debug!(size, class_size, "allocator slab created");
        Ok(slab)
    }

    /// Pushes every usable piece of `range` into its bucket.
    ///
    /// # Safety
    ///
    /// `range` lies inside `slab`, is owned by the caller, and is unused.
    unsafe fn recycle(&self, slab: NonNull<Slab>, range: Range<usize>) {
        for (offset, index) in Self::CLASSES.fragments(range.start, range.end) {
            // SAFETY: piece is inside the slab, class-aligned, and unused.
            unsafe { self.buckets[index].push(Slab::at(slab, offset)) };
            StatCounters::bump(&self.stats.fragments_recycled, 1);
        }
    }
}

impl<const MIN_SIZE_POWER: u32, const MAX_SIZE_POWER: u32, const MAX_STACK_SIZE_POWER: u32> Default
    for SafeAllocator<MIN_SIZE_POWER, MAX_SIZE_POWER, MAX_STACK_SIZE_POWER>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const MIN_SIZE_POWER: u32, const MAX_SIZE_POWER: u32, const MAX_STACK_SIZE_POWER: u32>
    RawAllocator for SafeAllocator<MIN_SIZE_POWER, MAX_SIZE_POWER, MAX_STACK_SIZE_POWER>
{
    #[inline]
    fn allocate(&self, size: usize, alignment: usize) -> LockfreeResult<NonNull<u8>> {
        SafeAllocator::allocate(self, size, alignment)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { SafeAllocator::deallocate(self, ptr, size, alignment) }
    }
}

impl<const MIN_SIZE_POWER: u32, const MAX_SIZE_POWER: u32, const MAX_STACK_SIZE_POWER: u32> Drop
    for SafeAllocator<MIN_SIZE_POWER, MAX_SIZE_POWER, MAX_STACK_SIZE_POWER>
{
    fn drop(&mut self) {
        while let Some(slab) = self.active.pop() {
            // SAFETY: popped slabs are owned; busy list lives as long as self.
            unsafe { self.busy.push(slab) };
        }

        let mut released = 0usize;
        let mut released_bytes = 0usize;
        while let Some(slab) = self.busy.pop() {
            // SAFETY: every slab on the list came from `Slab::create` with
            // SLAB_ALIGN; nothing carved from it outlives the allocator.
            unsafe {
                released_bytes += Slab::size(slab);
                Slab::destroy(slab, Self::SLAB_ALIGN);
            }
            released += 1;
        }

        if released > 0 {
            tracing::debug!(released, released_bytes, "allocator slabs released");
        }
    }
}
