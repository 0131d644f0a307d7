//! Producer end of the queue

use core::alloc::Layout;
use core::sync::atomic::Ordering;

use alloc::sync::Arc;
use ede_core::{EdeError, EdeResult};
use ede_mem::MemoryPool;

use crate::ring::Shared;
use crate::{element_size, ring_size, QueueHead, ALIGN_OF_PAYLOAD};

/// The writing end of a variable-size queue
///
/// Owned by exactly one producer context. All operations are O(1) apart from
/// the bookkeeping walk over the elements the consumer released since the
/// last allocation.
pub struct QueueTail {
    shared: Arc<Shared>,
    /// The producer's own view of the consumer position, advanced along the
    /// element chain. Lets the producer verify the consumer's offset and count
    /// the queued elements without read-modify-write operations.
    idx_head_copy: u32,
    usage: u32,
    allocated: Option<u32>,
    linked: bool,
    /// Dimensioned for zero records: every allocation fails
    zero_capacity: bool,
}

impl QueueTail {
    /// Create the producer end of a queue for `max_std_elements` records of
    /// `std_payload_size` bytes
    ///
    /// Records of other sizes can be queued as well; the dimensioning only
    /// states how many standard records are guaranteed to fit.
    pub fn new(
        max_std_elements: usize,
        std_payload_size: usize,
        pool: &dyn MemoryPool,
    ) -> EdeResult<Self> {
        let size = ring_size(max_std_elements, std_payload_size)?;
        let ring = Layout::from_size_align(size, ALIGN_OF_PAYLOAD)
            .map_err(|_| EdeError::InvalidGeometry)?;
        pool.allocate(ring)?;
        pool.allocate(Layout::new::<Shared>())?;

        let shared = Shared::new(size);
        let idx_tail = shared.idx_tail.load(Ordering::Relaxed);
        log::debug!(
            "queue created: {} x {} bytes, ring of {} bytes",
            max_std_elements,
            std_payload_size,
            size
        );
        Ok(Self {
            shared: Arc::new(shared),
            idx_head_copy: idx_tail,
            usage: 0,
            allocated: None,
            linked: false,
            zero_capacity: max_std_elements == 0,
        })
    }

    /// Create the unique consumer end of this queue
    pub fn link_head(&mut self) -> EdeResult<QueueHead> {
        if self.linked {
            return Err(EdeError::AlreadyLinked);
        }
        self.linked = true;
        Ok(QueueHead::new(self.shared.clone()))
    }

    /// Reserve room for a record of `size` bytes
    ///
    /// Returns the writable payload or `None` if the queue is full or the
    /// communication is broken. The record becomes visible to the consumer
    /// only with [`QueueTail::post`]. A second allocation before posting
    /// replaces the first one.
    pub fn allocate(&mut self, size: usize) -> Option<&mut [u8]> {
        match self.find_room(size) {
            Some(idx) => {
                self.allocated = Some(idx);
                // SAFETY: the element at `idx` lies outside the consumer's
                // region and has not been published; the returned borrow of
                // `self` keeps this the only reference to it.
                Some(unsafe { self.shared.payload_mut(idx, size) })
            }
            None => {
                self.allocated = None;
                self.shared.count_drop();
                None
            }
        }
    }

    /// Publish the record reserved by the last [`QueueTail::allocate`]
    ///
    /// Returns `false` if there is nothing to publish.
    pub fn post(&mut self) -> bool {
        let Some(idx) = self.allocated.take() else {
            return false;
        };
        // Everything written into the element and the link in the previous
        // tail becomes visible together with the new tail offset.
        self.shared.idx_tail.store(idx, Ordering::Release);
        self.usage += 1;
        if self.usage > self.shared.max_usage.load(Ordering::Relaxed) {
            self.shared.max_usage.store(self.usage, Ordering::Relaxed);
        }
        true
    }

    /// Copy `data` into the queue as one record
    pub fn write(&mut self, data: &[u8]) -> bool {
        match self.allocate(data.len()) {
            Some(payload) => {
                payload.copy_from_slice(data);
                self.post()
            }
            None => false,
        }
    }

    /// True after the producer detected an inconsistent consumer position
    pub fn is_communication_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Acquire)
    }

    /// Records currently queued, as far as the producer knows
    pub fn usage(&self) -> u32 {
        self.usage
    }

    /// Maximum number of records ever queued at the same time
    pub fn max_usage(&self) -> u32 {
        self.shared.max_usage.load(Ordering::Relaxed)
    }

    /// Maximum number of ring bytes ever in use, headers and the consumer's
    /// element included
    pub fn max_usage_in_bytes(&self) -> u32 {
        self.shared.max_usage_in_bytes.load(Ordering::Relaxed)
    }

    /// Size of the ring buffer in bytes
    pub fn ring_size(&self) -> usize {
        self.shared.size() as usize
    }

    /// Advance the private consumer position up to the published one
    ///
    /// Returns the consumer offset, or `None` if the walk hit the tail without
    /// meeting it, which means the consumer's offset is corrupt.
    fn sync_head(&mut self, idx_tail: u32) -> Option<u32> {
        let idx_head = self.shared.idx_head.load(Ordering::Acquire);
        let size = self.shared.size();
        if idx_head >= size || idx_head % ALIGN_OF_PAYLOAD as u32 != 0 {
            return None;
        }
        let mut copy = self.idx_head_copy;
        while copy != idx_head {
            if copy == idx_tail {
                return None;
            }
            self.usage = self.usage.saturating_sub(1);
            // SAFETY: elements between the old and the new consumer position
            // have been released by the consumer and were linked by us.
            copy = unsafe { self.shared.read_link(copy) };
        }
        self.idx_head_copy = copy;
        Some(idx_head)
    }

    fn find_room(&mut self, size: usize) -> Option<u32> {
        if self.zero_capacity || self.is_communication_broken() {
            return None;
        }
        let idx_tail = self.shared.idx_tail.load(Ordering::Relaxed);
        let Some(idx_head) = self.sync_head(idx_tail) else {
            log::warn!("queue consumer position corrupt, communication broken");
            self.idx_head_copy = idx_tail;
            self.usage = 0;
            self.shared.broken.store(true, Ordering::Release);
            return None;
        };

        let ring = self.shared.size();
        let elem = element_size(size);
        if size > u16::MAX as usize || elem > ring as usize {
            return None;
        }
        let elem = elem as u32;

        // First candidate is the place directly behind the tail. The record
        // is never split: if the end of the ring is too short, continue at 0.
        // SAFETY: the tail element is ours to read until it is consumed, and
        // its link is only written by us.
        let idx_new = unsafe { self.shared.read_link(idx_tail) };
        let placed = if idx_new > idx_head {
            if ring >= idx_new + elem {
                Some(idx_new)
            } else if idx_head >= elem {
                Some(0)
            } else {
                None
            }
        } else if idx_new < idx_head && idx_head >= idx_new + elem {
            Some(idx_new)
        } else {
            None
        };
        let placed = placed?;

        let mut successor = placed + elem;
        if successor >= ring {
            successor = 0;
        }
        // SAFETY: the consumer follows the tail's link only after the tail
        // offset has moved on, which happens in `post`. The new element lies
        // in free space.
        unsafe {
            self.shared.write_link(idx_tail, placed);
            self.shared.write_header(placed, successor, size as u32);
        }

        let mut in_use = successor.wrapping_sub(idx_head) as i32;
        if in_use <= 0 {
            in_use += ring as i32;
        }
        if in_use as u32 > self.shared.max_usage_in_bytes.load(Ordering::Relaxed) {
            self.shared
                .max_usage_in_bytes
                .store(in_use as u32, Ordering::Relaxed);
        }
        Some(placed)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}
