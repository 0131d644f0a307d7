//! Fixed-capacity tables drawn from a memory pool

use core::alloc::Layout;
use core::ops::{Deref, DerefMut};

use alloc::vec::Vec;
use ede_core::{EdeError, EdeResult};

use crate::MemoryPool;

/// Index-addressed table whose capacity is fixed at creation
///
/// Entries are appended and never removed, so an index stays valid for the
/// lifetime of the table.
#[derive(Debug)]
pub struct Table<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Table<T> {
    /// Append an entry and return its index, or hand it back if full
    pub fn push(&mut self, item: T) -> Result<usize, T> {
        if self.is_full() {
            return Err(item);
        }
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Remove the most recently appended entry
    ///
    /// Used to roll back a registration that failed after the append.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Drop all entries; the capacity stays reserved
    ///
    /// Only for tables used as scratch space. Indices handed out before are
    /// invalid afterwards.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

impl<T> Deref for Table<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for Table<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T> IntoIterator for Table<T> {
    type Item = T;
    type IntoIter = alloc::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Draw an empty table for `capacity` entries from `pool`
pub fn alloc_table<T>(pool: &dyn MemoryPool, capacity: usize) -> EdeResult<Table<T>> {
    let layout = Layout::array::<T>(capacity).map_err(|_| EdeError::OutOfMemory)?;
    pool.allocate(layout)?;
    Ok(Table {
        items: Vec::with_capacity(capacity),
        capacity,
    })
}

/// Draw a table from `pool` and fill all `capacity` entries with `init`
pub fn alloc_table_with<T>(
    pool: &dyn MemoryPool,
    capacity: usize,
    mut init: impl FnMut(usize) -> T,
) -> EdeResult<Table<T>> {
    let mut table = alloc_table(pool, capacity)?;
    table.items.extend((0..capacity).map(&mut init));
    Ok(table)
}
