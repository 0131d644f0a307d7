//! Ring storage and the control block shared by both queue ends

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::{ALIGN_OF_PAYLOAD, ELEMENT_HEADER_SIZE};

/// Control block and storage of one queue
///
/// Ring bytes are written by the producer and read by the consumer. Which
/// element belongs to whom is decided solely by `idx_head` and `idx_tail`:
/// elements behind the head up to the tail are the consumer's, everything
/// else is the producer's.
pub(crate) struct Shared {
    words: Box<[UnsafeCell<usize>]>,
    size: u32,
    /// Offset of the element owned by the consumer. Written by the consumer.
    pub idx_head: AtomicU32,
    /// Offset of the last published element. Written by the producer.
    pub idx_tail: AtomicU32,
    /// Raised by the producer when the consumer's offset is inconsistent
    pub broken: AtomicBool,
    pub max_usage: AtomicU32,
    pub max_usage_in_bytes: AtomicU32,
    /// Rejected allocations, saturating
    pub drops: AtomicU32,
}

// SAFETY: the ring words are only accessed through the element protocol
// described above. The producer and the consumer never touch the same element
// at the same time, and ownership changes hands only through the
// release/acquire pairs on `idx_tail` and `idx_head`.
unsafe impl Sync for Shared {}

impl Shared {
    pub fn new(size: usize) -> Self {
        let word = core::mem::size_of::<usize>();
        let words: Vec<UnsafeCell<usize>> =
            (0..size.div_ceil(word)).map(|_| UnsafeCell::new(0)).collect();
        let initial_tail = (size - ELEMENT_HEADER_SIZE) as u32;
        let shared = Self {
            words: words.into_boxed_slice(),
            size: size as u32,
            idx_head: AtomicU32::new(initial_tail),
            idx_tail: AtomicU32::new(initial_tail),
            broken: AtomicBool::new(false),
            max_usage: AtomicU32::new(0),
            max_usage_in_bytes: AtomicU32::new(0),
            drops: AtomicU32::new(0),
        };
        // The initial, empty element at the very end of the ring links to the
        // place directly behind it. Putting it last lets a queue of standard
        // elements fill up without any skipped space.
        let successor = (initial_tail + ELEMENT_HEADER_SIZE as u32) % shared.size;
        // SAFETY: nobody else can reach the storage yet.
        unsafe { shared.write_link(initial_tail, successor) };
        shared
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn byte_ptr(&self, offset: u32) -> *mut u8 {
        debug_assert!((offset as usize) <= self.words.len() * core::mem::size_of::<usize>());
        // A pointer derived from the shared slice of `UnsafeCell`s may be
        // used for writing.
        let base = self.words.as_ptr() as *mut u8;
        base.wrapping_add(offset as usize)
    }

    /// Offset of the successor of the element at `idx`
    ///
    /// # Safety
    /// The caller must own the element at `idx`, or it must have been
    /// published to the caller.
    pub unsafe fn read_link(&self, idx: u32) -> u32 {
        debug_assert!(idx % ALIGN_OF_PAYLOAD as u32 == 0 && idx < self.size);
        u32::from(core::ptr::read(self.byte_ptr(idx) as *const u16))
    }

    /// Payload size of the element at `idx`
    ///
    /// # Safety
    /// Same as [`Shared::read_link`].
    pub unsafe fn read_size(&self, idx: u32) -> u32 {
        u32::from(core::ptr::read(self.byte_ptr(idx).add(2) as *const u16))
    }

    /// # Safety
    /// Only the producer may call this, and only for the current tail or an
    /// element it has not published yet.
    pub unsafe fn write_link(&self, idx: u32, successor: u32) {
        debug_assert!(idx % ALIGN_OF_PAYLOAD as u32 == 0 && successor < self.size);
        core::ptr::write(self.byte_ptr(idx) as *mut u16, successor as u16);
    }

    /// # Safety
    /// Same as [`Shared::write_link`].
    pub unsafe fn write_header(&self, idx: u32, successor: u32, payload_size: u32) {
        self.write_link(idx, successor);
        core::ptr::write(self.byte_ptr(idx).add(2) as *mut u16, payload_size as u16);
    }

    /// # Safety
    /// Producer only, for an allocated but unpublished element of at least
    /// `len` payload bytes. No other reference to that payload may exist.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn payload_mut(&self, idx: u32, len: usize) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.byte_ptr(idx + ELEMENT_HEADER_SIZE as u32), len)
    }

    /// # Safety
    /// Consumer only, for the element it currently owns.
    pub unsafe fn payload(&self, idx: u32, len: usize) -> &[u8] {
        core::slice::from_raw_parts(self.byte_ptr(idx + ELEMENT_HEADER_SIZE as u32), len)
    }

    pub fn count_drop(&self) {
        let _ = self
            .drops
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
    }
}
