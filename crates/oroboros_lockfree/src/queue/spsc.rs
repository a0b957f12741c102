//! # SPSC Queue
//!
//! One producer thread, one consumer thread. Neither side ever CASes:
//! each owns its index and keeps a cached copy of the other's, re-read
//! only when the queue looks full (producer) or empty (consumer).

use super::{BoundedQueue, Consumer, Producer, Single};
use crate::memory::SystemAllocator;

/// Single-producer, single-consumer bounded queue.
pub type SpscQueue<T, A = SystemAllocator> = BoundedQueue<T, Single, Single, A>;

/// Write end of an [`SpscQueue`].
pub type SpscProducer<T, A = SystemAllocator> = Producer<T, Single, Single, A>;

/// Read end of an [`SpscQueue`].
pub type SpscConsumer<T, A = SystemAllocator> = Consumer<T, Single, Single, A>;
