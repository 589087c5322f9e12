//! Bounded allocation arenas
//!
//! An arena hands out zero-initialized blocks and only gives memory back as a
//! whole, when it is released. Capacity starts at `initial` bytes and grows in
//! `increment` steps, never beyond an optional `limit`.

use crate::config::PoolConfig;
use crate::error::{AdapterError, Result};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use tracing::{debug, trace};

#[derive(Debug)]
struct ArenaUsage {
    capacity: usize,
    used: usize,
    released: bool,
}

/// Named, bounded allocation arena
#[derive(Debug)]
pub struct Arena {
    name: String,
    increment: usize,
    limit: Option<usize>,
    usage: Mutex<ArenaUsage>,
}

impl Arena {
    /// Create a new arena
    pub fn new(name: impl Into<String>, initial: usize, increment: usize, limit: Option<usize>) -> Self {
        let capacity = limit.map_or(initial, |l| initial.min(l));
        Self {
            name: name.into(),
            increment,
            limit,
            usage: Mutex::new(ArenaUsage {
                capacity,
                used: 0,
                released: false,
            }),
        }
    }

    /// Create an arena from pool settings
    pub fn from_config(name: impl Into<String>, config: &PoolConfig) -> Self {
        Self::new(name, config.initial, config.increment, config.limit)
    }

    /// Carve a zeroed block of `size` bytes, growing capacity if needed
    pub fn allocate_zeroed(&self, size: usize) -> Result<ArenaBlock> {
        self.reserve(size)?;
        Ok(ArenaBlock::zeroed(size))
    }

    /// Account for `size` bytes held elsewhere, without handing out a block
    pub fn reserve(&self, size: usize) -> Result<()> {
        let mut usage = self.usage.lock();
        if usage.released {
            return Err(self.out_of_memory(size));
        }

        let needed = usage.used.checked_add(size).ok_or_else(|| self.out_of_memory(size))?;
        if needed > usage.capacity {
            if self.increment == 0 {
                return Err(self.out_of_memory(size));
            }
            let shortfall = needed - usage.capacity;
            let steps = (shortfall + self.increment - 1) / self.increment;
            let mut grown = usage.capacity.saturating_add(steps.saturating_mul(self.increment));
            if let Some(limit) = self.limit {
                grown = grown.min(limit);
            }
            if grown < needed {
                return Err(self.out_of_memory(size));
            }
            debug!(
                "Arena '{}' grew from {} to {} bytes",
                self.name, usage.capacity, grown
            );
            usage.capacity = grown;
        }

        usage.used = needed;
        trace!("Arena '{}' reserved {} bytes ({} in use)", self.name, size, needed);
        Ok(())
    }

    /// Give everything back; later allocations fail
    pub fn release(&self) {
        let mut usage = self.usage.lock();
        if !usage.released {
            debug!("Arena '{}' released ({} bytes in use)", self.name, usage.used);
        }
        usage.released = true;
        usage.used = 0;
        usage.capacity = 0;
    }

    /// Arena name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes handed out so far
    pub fn used(&self) -> usize {
        self.usage.lock().used
    }

    /// Current capacity in bytes
    pub fn capacity(&self) -> usize {
        self.usage.lock().capacity
    }

    /// Check if the arena was released
    pub fn is_released(&self) -> bool {
        self.usage.lock().released
    }

    fn out_of_memory(&self, requested: usize) -> AdapterError {
        AdapterError::OutOfMemory {
            pool: self.name.clone(),
            requested,
        }
    }
}

/// Zero-initialized block carved from an [`Arena`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaBlock {
    bytes: Box<[u8]>,
}

impl ArenaBlock {
    fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size].into_boxed_slice(),
        }
    }
}

impl Deref for ArenaBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for ArenaBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
