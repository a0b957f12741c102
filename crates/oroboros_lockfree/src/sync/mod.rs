//! # Lock-Free List Primitives
//!
//! ARCHITECT'S ORDER: No locks. No ABA. No compromises.
//!
//! ## The Problem
//!
//! ```text
//! Thread 1:  reads head = A, reads A.next = B        ... preempted ...
//! Thread 2:  pops A, pops B, pushes A back
//! Thread 1:  CAS(head, A -> B) succeeds              → B is in use AND on the list
//! ```
//!
//! ## The Solution: Tagged Heads
//!
//! The head is an `(address, generation)` pair compared and swapped as a
//! single 128-bit word. Thread 1 captured generation `n`; after Thread 2's
//! three updates the head is `(A, n + 3)` and the stale CAS fails.

mod bucket;
mod stack;
mod tagged;

pub use bucket::AtomicBucket;
pub use stack::{AtomicStack, Intrusive, Link};
pub use tagged::{AtomicTaggedPtr, TaggedPtr};
