//! # SPMC Queue
//!
//! One producer, many consumers. Mirror image of MPSC: consumers claim
//! runs with a CAS on the committed head and release slots in claim order.

use super::{BoundedQueue, Consumer, Multi, Producer, Single};
use crate::memory::SystemAllocator;

/// Single-producer, multi-consumer bounded queue.
pub type SpmcQueue<T, A = SystemAllocator> = BoundedQueue<T, Single, Multi, A>;

/// Write end of an [`SpmcQueue`].
pub type SpmcProducer<T, A = SystemAllocator> = Producer<T, Single, Multi, A>;

/// Read end of an [`SpmcQueue`]. Clone one per consumer thread.
pub type SpmcConsumer<T, A = SystemAllocator> = Consumer<T, Single, Multi, A>;
