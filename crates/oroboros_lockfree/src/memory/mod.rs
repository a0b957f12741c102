//! # Memory Management
//!
//! Raw allocation for queue storage and the engine's small-object churn.
//!
//! ## Design Philosophy
//!
//! Memory is taken from the system in large slabs and never handed back
//! until the allocator dies. In between:
//! - No locks
//! - Freed blocks are reused by size class in O(1)
//! - Leftover slab bytes are cut into smaller classes, not wasted
//!
//! Anything bigger than the largest class goes straight to the system.

mod raw;
mod safe;
mod size_class;
mod slab;

pub use raw::{RawAllocator, SystemAllocator};
pub use safe::{AllocatorStats, SafeAllocator};
pub use size_class::{Fragments, SizeClasses};
