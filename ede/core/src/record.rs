//! Event record layout used across the dispatcher queues
//!
//! A record is a fixed header `{kind, sender handle}` followed by the payload
//! bytes. The header is padded to the common machine alignment so that the
//! payload starts at an aligned offset whenever the record itself does. The
//! payload size is not part of the header; it is the queue element size minus
//! [`EVENT_HEADER_SIZE`].

use crate::{EventKind, SenderHandle};

/// Alignment every queued record and its payload honour
pub const COMMON_MACHINE_ALIGNMENT: usize = if core::mem::align_of::<usize>() > 4 {
    core::mem::align_of::<usize>()
} else {
    4
};

/// Round `size` up to the next multiple of `align` (a power of two)
pub const fn align_up(size: usize, align: usize) -> usize {
    let mask = align - 1;
    (size + mask) & !mask
}

const RAW_HEADER_SIZE: usize = 8;

/// Size of the record header including padding
pub const EVENT_HEADER_SIZE: usize = align_up(RAW_HEADER_SIZE, COMMON_MACHINE_ALIGNMENT);

/// Total queue element size for a payload of `payload_size` bytes
pub const fn event_record_size(payload_size: usize) -> usize {
    EVENT_HEADER_SIZE + payload_size
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub kind: EventKind,
    pub sender_handle: SenderHandle,
}

impl EventHeader {
    pub const fn new(kind: EventKind, sender_handle: SenderHandle) -> Self {
        Self {
            kind,
            sender_handle,
        }
    }

    /// Serialize header and payload into `dst`
    ///
    /// `dst` must be exactly [`event_record_size`] of the payload length.
    pub fn encode(&self, payload: &[u8], dst: &mut [u8]) -> bool {
        if dst.len() != event_record_size(payload.len()) {
            return false;
        }
        let (head, body) = dst.split_at_mut(EVENT_HEADER_SIZE);
        head[..4].copy_from_slice(&self.kind.raw().to_ne_bytes());
        head[4..RAW_HEADER_SIZE].copy_from_slice(&self.sender_handle.raw().to_ne_bytes());
        head[RAW_HEADER_SIZE..].fill(0);
        body.copy_from_slice(payload);
        true
    }

    /// Split a queued record into header and payload
    pub fn decode(record: &[u8]) -> Option<(EventHeader, &[u8])> {
        if record.len() < EVENT_HEADER_SIZE {
            return None;
        }
        let (head, body) = record.split_at(EVENT_HEADER_SIZE);
        let mut word = [0u8; 4];
        word.copy_from_slice(&head[..4]);
        let kind = EventKind(u32::from_ne_bytes(word));
        word.copy_from_slice(&head[4..RAW_HEADER_SIZE]);
        let sender_handle = SenderHandle(u32::from_ne_bytes(word));
        Some((EventHeader::new(kind, sender_handle), body))
    }
}
