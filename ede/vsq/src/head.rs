//! Consumer end of the queue

use core::sync::atomic::Ordering;

use alloc::sync::Arc;

use crate::ring::Shared;

/// The reading end of a variable-size queue
///
/// Owned by exactly one consumer context. Created through
/// [`QueueTail::link_head`](crate::QueueTail::link_head).
pub struct QueueHead {
    shared: Arc<Shared>,
}

impl QueueHead {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Take the next record from the queue
    ///
    /// The returned payload stays valid until the next call; reading it
    /// releases the record read before. Returns `None` if the queue is empty
    /// or the communication is broken.
    pub fn read(&mut self) -> Option<&[u8]> {
        if self.shared.broken.load(Ordering::Acquire) {
            return None;
        }
        let idx_read = self.shared.idx_head.load(Ordering::Relaxed);
        let idx_tail = self.shared.idx_tail.load(Ordering::Acquire);
        if idx_read == idx_tail {
            return None;
        }
        // SAFETY: the tail has moved past `idx_read`, so its link and the
        // successor element are complete and published.
        let (idx_new, size) = unsafe {
            let idx_new = self.shared.read_link(idx_read);
            (idx_new, self.shared.read_size(idx_new))
        };
        // Done with the previous element; hand it back to the producer.
        self.shared.idx_head.store(idx_new, Ordering::Release);
        // SAFETY: the element at `idx_new` is now owned by the consumer, and
        // the borrow of `self` ends before the next read gives it back.
        Some(unsafe { self.shared.payload(idx_new, size as usize) })
    }

    /// True if at least one record is waiting
    pub fn has_pending(&self) -> bool {
        !self.shared.broken.load(Ordering::Acquire)
            && self.shared.idx_head.load(Ordering::Relaxed)
                != self.shared.idx_tail.load(Ordering::Acquire)
    }

    /// True after the producer found this end's position inconsistent
    pub fn is_communication_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Acquire)
    }

    /// Resynchronize after a broken communication
    ///
    /// Discards all records still in the queue and re-enables the producer.
    /// Returns `false` if the communication was not broken.
    pub fn acknowledge_resync(&mut self) -> bool {
        if !self.shared.broken.load(Ordering::Acquire) {
            return false;
        }
        // While the flag is raised the producer does not move the tail.
        let idx_tail = self.shared.idx_tail.load(Ordering::Acquire);
        self.shared.idx_head.store(idx_tail, Ordering::Release);
        self.shared.broken.store(false, Ordering::Release);
        log::debug!("queue resynchronized at offset {}", idx_tail);
        true
    }

    /// Number of records rejected because the queue was full or broken
    ///
    /// The counter saturates; `reset` clears it atomically with reading.
    pub fn drop_count(&self, reset: bool) -> u32 {
        if reset {
            self.shared.drops.swap(0, Ordering::Relaxed)
        } else {
            self.shared.drops.load(Ordering::Relaxed)
        }
    }

    /// Maximum number of records ever queued at the same time
    pub fn max_usage(&self) -> u32 {
        self.shared.max_usage.load(Ordering::Relaxed)
    }

    /// Maximum number of ring bytes ever in use
    pub fn max_usage_in_bytes(&self) -> u32 {
        self.shared.max_usage_in_bytes.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn force_read_position(&self, idx: u32) {
        self.shared.idx_head.store(idx, Ordering::Release);
    }
}
