#![no_std]
#![allow(unsafe_code)] // The ring buffer is shared memory between two contexts

//! # EDE Variable-Size Queue
//!
//! A queue of byte records of varying length that moves data from exactly one
//! producer context to exactly one consumer context (interrupt to task, core
//! to core) without locks and without dynamic allocation after creation.
//!
//! The storage is a ring buffer of linked elements. Every element has a small
//! header holding the ring offset of its successor and the payload size, and
//! the payload follows at the next aligned offset. An element is never
//! wrapped around the end of the ring; if the rest of the ring is too short
//! the producer skips it and continues at offset zero.
//!
//! The consumer always owns exactly one element: the one it read last. Its
//! space is given back with the next read. This is why a queue dimensioned for
//! `n` standard records reserves `n + 1` element slots.
//!
//! ## Memory ordering
//!
//! The producer fills an element and links it in, then publishes it with a
//! `Release` store of the tail offset. The consumer `Acquire`-loads the tail
//! before it follows a link, so it never observes a torn element. The other
//! way around, the consumer `Release`-stores the head offset after it is done
//! with an element and the producer `Acquire`-loads it before reusing space.

extern crate alloc;

mod head;
mod ring;
mod tail;

pub use head::QueueHead;
pub use tail::QueueTail;

use ede_core::{align_up, EdeError, EdeResult, COMMON_MACHINE_ALIGNMENT};

/// Alignment of every element and its payload
pub const ALIGN_OF_PAYLOAD: usize = COMMON_MACHINE_ALIGNMENT;

/// Size of the element header: link to successor and payload size, padded
pub const ELEMENT_HEADER_SIZE: usize = align_up(4, ALIGN_OF_PAYLOAD);

/// Largest ring the 16-bit element links can address
pub const MAX_RING_SIZE: usize = u16::MAX as usize;

/// Ring space occupied by one element carrying `payload_size` bytes
pub const fn element_size(payload_size: usize) -> usize {
    ELEMENT_HEADER_SIZE + align_up(payload_size, ALIGN_OF_PAYLOAD)
}

/// Size in bytes of the ring for `max_std_elements` records of
/// `std_payload_size` bytes each
///
/// One element more than requested is reserved for the element owned by the
/// consumer. Fails if the ring exceeds the range of the element links.
pub fn ring_size(max_std_elements: usize, std_payload_size: usize) -> EdeResult<usize> {
    let size = max_std_elements
        .checked_add(1)
        .and_then(|slots| slots.checked_mul(element_size(std_payload_size)))
        .ok_or(EdeError::InvalidGeometry)?;
    if size > MAX_RING_SIZE {
        log::warn!(
            "queue of {} x {} bytes needs a {} byte ring, limit is {}",
            max_std_elements,
            std_payload_size,
            size,
            MAX_RING_SIZE
        );
        return Err(EdeError::InvalidGeometry);
    }
    Ok(size)
}

/// Create a queue and return its producer and consumer ends
pub fn create_queue(
    max_std_elements: usize,
    std_payload_size: usize,
    pool: &dyn ede_mem::MemoryPool,
) -> EdeResult<(QueueTail, QueueHead)> {
    let mut tail = QueueTail::new(max_std_elements, std_payload_size, pool)?;
    let head = tail.link_head()?;
    Ok((tail, head))
}

#[cfg(test)]
extern crate std;
