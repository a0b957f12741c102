//! # MPSC Queue
//!
//! Many producers, one consumer. Producers claim slots with a CAS on the
//! committed tail and publish in claim order. The consumer side is the
//! same as SPSC.

use super::{BoundedQueue, Consumer, Multi, Producer, Single};
use crate::memory::SystemAllocator;

/// Multi-producer, single-consumer bounded queue.
pub type MpscQueue<T, A = SystemAllocator> = BoundedQueue<T, Multi, Single, A>;

/// Write end of an [`MpscQueue`]. Clone one per producer thread.
pub type MpscProducer<T, A = SystemAllocator> = Producer<T, Multi, Single, A>;

/// Read end of an [`MpscQueue`].
pub type MpscConsumer<T, A = SystemAllocator> = Consumer<T, Multi, Single, A>;
