//! # OROBOROS Lock-Free Core
//!
//! The layer under the task scheduler, the ECS and the device wrappers:
//! - Bounded ring queues for every producer/consumer shape
//! - A size-classed slab allocator with ABA-safe free lists
//!
//! ## Architecture Rules
//!
//! 1. **Never block** - full and empty come back immediately as values
//! 2. **Fixed capacity** - queue buffers are allocated once, at construction
//! 3. **Explicit allocators** - memory comes from a [`RawAllocator`] passed in,
//!    never from a hidden global
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_lockfree::{MpscQueue, SafeAllocator};
//! use std::sync::Arc;
//!
//! let allocator = Arc::new(SafeAllocator::<4, 16, 24>::new());
//! let (tx, mut rx) = MpscQueue::<Job, _>::with_allocator(4096, allocator)?.split();
//!
//! let mut worker_tx = tx.clone();
//! std::thread::spawn(move || {
//!     let _ = worker_tx.push(Job::default());
//! });
//!
//! while let Some(job) = rx.pop() {
//!     job.run();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod sync;

pub use config::{AllocatorConfig, LockfreeConfig, QueueConfig};
pub use error::{LockfreeError, LockfreeResult};
pub use memory::{AllocatorStats, RawAllocator, SafeAllocator, SizeClasses, SystemAllocator};
pub use queue::{
    BoundedQueue, Consumer, Cursor, Multi, Producer, Single,
    MpmcConsumer, MpmcProducer, MpmcQueue,
    MpscConsumer, MpscProducer, MpscQueue,
    SpmcConsumer, SpmcProducer, SpmcQueue,
    SpscConsumer, SpscProducer, SpscQueue,
};
pub use sync::{AtomicBucket, AtomicStack, AtomicTaggedPtr, TaggedPtr};
