use core::alloc::Layout;
use core::cell::Cell;

use critical_section::Mutex;
use ede_core::EdeResult;

use crate::{MemoryPool, PoolStats};

/// A pool with a fixed byte budget
///
/// Usable as a `static`: the bookkeeping sits behind a critical section.
pub struct FixedPool {
    stats: Mutex<Cell<PoolStats>>,
}

impl FixedPool {
    /// Create a pool that hands out at most `size` bytes
    pub const fn new(size: usize) -> Self {
        Self {
            stats: Mutex::new(Cell::new(PoolStats::new(Some(size)))),
        }
    }

    /// Snapshot of the pool statistics
    pub fn stats(&self) -> PoolStats {
        critical_section::with(|cs| self.stats.borrow(cs).get())
    }
}

impl MemoryPool for FixedPool {
    fn allocate(&self, layout: Layout) -> EdeResult<()> {
        critical_section::with(|cs| {
            let cell = self.stats.borrow(cs);
            let mut stats = cell.get();
            let result = stats.on_alloc(layout);
            cell.set(stats);
            if result.is_err() {
                log::warn!(
                    "memory pool exhausted: {} bytes requested, {:?} available",
                    layout.size(),
                    stats.available_bytes()
                );
            }
            result
        })
    }

    fn available_bytes(&self) -> Option<usize> {
        self.stats().available_bytes()
    }

    fn allocated_bytes(&self) -> usize {
        self.stats().allocated_bytes
    }
}

/// A pool without budget that only keeps count
///
/// The counterpart of a plain `malloc` based pool for hosts where memory is
/// not the constraint.
pub struct HeapPool {
    stats: Mutex<Cell<PoolStats>>,
}

impl HeapPool {
    pub const fn new() -> Self {
        Self {
            stats: Mutex::new(Cell::new(PoolStats::new(None))),
        }
    }

    /// Snapshot of the pool statistics
    pub fn stats(&self) -> PoolStats {
        critical_section::with(|cs| self.stats.borrow(cs).get())
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool for HeapPool {
    fn allocate(&self, layout: Layout) -> EdeResult<()> {
        critical_section::with(|cs| {
            let cell = self.stats.borrow(cs);
            let mut stats = cell.get();
            let result = stats.on_alloc(layout);
            cell.set(stats);
            result
        })
    }

    fn available_bytes(&self) -> Option<usize> {
        None
    }

    fn allocated_bytes(&self) -> usize {
        self.stats().allocated_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pool_pads_to_alignment() {
        let pool = FixedPool::new(64);
        pool.allocate(Layout::from_size_align(3, 1).unwrap()).unwrap();
        pool.allocate(Layout::from_size_align(8, 8).unwrap()).unwrap();
        assert_eq!(pool.allocated_bytes(), 16);
        assert_eq!(pool.available_bytes(), Some(48));
    }

    #[test]
    fn fixed_pool_refuses_overdraft() {
        let pool = FixedPool::new(16);
        assert!(pool.allocate(Layout::from_size_align(12, 4).unwrap()).is_ok());
        assert_eq!(
            pool.allocate(Layout::from_size_align(8, 4).unwrap()),
            Err(ede_core::EdeError::OutOfMemory)
        );
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.allocated_bytes, 12);
    }

    #[test]
    fn heap_pool_never_refuses() {
        let pool = HeapPool::new();
        pool.allocate(Layout::from_size_align(1 << 20, 8).unwrap()).unwrap();
        assert_eq!(pool.available_bytes(), None);
        assert_eq!(pool.allocated_bytes(), 1 << 20);
    }
}
