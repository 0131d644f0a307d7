#![no_std]
#![forbid(unsafe_code)]

//! # EDE Memory Management
//!
//! Memory for queues, event sources and timers is drawn exactly once, while
//! the system is being set up. A [`MemoryPool`] meters these requests against
//! a fixed budget; once registration is complete nothing touches the pool
//! again, so the dispatch loops never need a lock.
//!
//! The tables handed out by [`alloc_table`] have a fixed capacity and refuse
//! to grow past it.

extern crate alloc;

use core::alloc::Layout;

use ede_core::{EdeError, EdeResult};

pub mod pools;
pub mod table;

pub use pools::*;
pub use table::*;

/// Interface of a one-way memory pool
///
/// There is no free operation: memory taken during setup stays in use for the
/// lifetime of the system.
pub trait MemoryPool {
    /// Take `layout.size()` bytes, with alignment padding, from the pool
    fn allocate(&self, layout: Layout) -> EdeResult<()>;

    /// Bytes still available, or `None` if the pool has no fixed budget
    fn available_bytes(&self) -> Option<usize>;

    /// Bytes handed out so far (diagnostic)
    fn allocated_bytes(&self) -> usize;
}

/// Memory pool statistics for debugging and dimensioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Size of the budget in bytes, `None` if unbounded
    pub capacity: Option<usize>,
    /// Bytes handed out, including alignment padding
    pub allocated_bytes: usize,
    /// Number of successful requests
    pub allocations: usize,
    /// Number of requests the pool had to refuse
    pub rejected: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub const fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            allocated_bytes: 0,
            allocations: 0,
            rejected: 0,
        }
    }

    /// Bytes left in the budget
    pub fn available_bytes(&self) -> Option<usize> {
        self.capacity
            .map(|capacity| capacity.saturating_sub(self.allocated_bytes))
    }

    /// Try to account for a request of `layout`
    ///
    /// Padding is inserted in front of the block so that it starts at an
    /// offset which is a multiple of the requested alignment.
    pub fn on_alloc(&mut self, layout: Layout) -> EdeResult<()> {
        let start = ede_core::align_up(self.allocated_bytes, layout.align());
        let end = start
            .checked_add(layout.size())
            .ok_or(EdeError::OutOfMemory)?;
        if matches!(self.capacity, Some(capacity) if end > capacity) {
            self.rejected += 1;
            return Err(EdeError::OutOfMemory);
        }
        self.allocated_bytes = end;
        self.allocations += 1;
        Ok(())
    }

    /// Get utilization as a percentage (0-100), 0 for unbounded pools
    pub fn utilization(&self) -> u8 {
        match self.capacity {
            Some(0) | None => 0,
            Some(capacity) => ((self.allocated_bytes * 100) / capacity) as u8,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ allocated: {}, allocations: {}, rejected: {} }}",
            self.allocated_bytes,
            self.allocations,
            self.rejected
        );
    }
}
