//! # Configuration
//!
//! Sizing policy for queues and the slab allocator. Loaded once at startup
//! from TOML; every field has a default so a partial file is valid.
//!
//! ```toml
//! [allocator]
//! initial_stack_size = 1048576
//! stack_growth_factor = 2
//!
//! [queue]
//! capacity = 65536
//! ```

use serde::Deserialize;

use crate::error::{LockfreeError, LockfreeResult};

/// Slab sizing policy for [`SafeAllocator`](crate::SafeAllocator).
///
/// Size-class bounds are type parameters of the allocator; this only
/// controls how big the bump slabs are when a bucket runs dry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Size in bytes of the first slab. Must be a power of two.
    pub initial_stack_size: usize,
    /// Each new slab is the largest previous slab times this factor,
    /// capped by the allocator's maximum slab size.
    pub stack_growth_factor: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            initial_stack_size: 64 * 1024,
            stack_growth_factor: 2,
        }
    }
}

impl AllocatorConfig {
    /// Server profile: start with 1MB slabs so warmup creates few of them.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            initial_stack_size: 1024 * 1024,
            stack_growth_factor: 2,
        }
    }

    /// Validates the sizing policy.
    ///
    /// # Errors
    ///
    /// Returns [`LockfreeError::InvalidConfig`] if the initial size is not a
    /// power of two or the growth factor is zero.
    pub fn validate(&self) -> LockfreeResult<()> {
        if !self.initial_stack_size.is_power_of_two() {
            return Err(LockfreeError::InvalidConfig(format!(
                "allocator.initial_stack_size must be a power of two, got {}",
                self.initial_stack_size
            )));
        }
        if self.stack_growth_factor == 0 {
            return Err(LockfreeError::InvalidConfig(
                "allocator.stack_growth_factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default shape of queues built from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of slots in the ring.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl QueueConfig {
    /// Server profile: 64K slots of headroom for burst absorption.
    #[must_use]
    pub const fn production() -> Self {
        Self { capacity: 65_536 }
    }

    /// Validates the queue shape.
    ///
    /// # Errors
    ///
    /// Returns [`LockfreeError::InvalidConfig`] if the capacity is zero.
    pub fn validate(&self) -> LockfreeResult<()> {
        if self.capacity == 0 {
            return Err(LockfreeError::InvalidConfig(
                "queue.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file for the lock-free core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockfreeConfig {
    /// Slab allocator sizing.
    pub allocator: AllocatorConfig,
    /// Queue defaults.
    pub queue: QueueConfig,
}

impl LockfreeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`LockfreeError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> LockfreeResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| LockfreeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        tracing::info!(
            initial_stack_size = config.allocator.initial_stack_size,
            queue_capacity = config.queue.capacity,
            "lock-free core configuration loaded"
        );
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first section error found.
    pub fn validate(&self) -> LockfreeResult<()> {
        self.allocator.validate()?;
        self.queue.validate()
    }
}
