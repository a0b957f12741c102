//! # Lock-Free Core Error Types
//!
//! Only construction and memory reservation can fail. A full queue, an
//! empty queue, or an allocation above the retained size range are normal
//! outcomes and come back as values (`Err(value)`, `None`, counts, or a
//! route to the system allocator).

use thiserror::Error;

/// Errors that can occur while building queues or reserving memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockfreeError {
    /// Queue capacity was zero or its buffer does not fit the address space.
    #[error("invalid queue capacity: {requested}")]
    InvalidCapacity {
        /// The capacity that was requested.
        requested: usize,
    },

    /// Alignment is not a power of two, or the size/alignment pair is not a valid layout.
    #[error("invalid layout: size {size}, alignment {alignment}")]
    InvalidLayout {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        alignment: usize,
    },

    /// The system allocator could not provide the memory.
    #[error("system allocation failed: {size} bytes aligned to {alignment}")]
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        alignment: usize,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for lock-free core operations.
pub type LockfreeResult<T> = Result<T, LockfreeError>;
