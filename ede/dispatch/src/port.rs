//! Port interfaces between senders, queues and dispatchers
//!
//! A port is one end of a connection that carries event records. The sender
//! side reserves a record, fills it and submits it; the dispatcher side reads
//! records in order. The queues of `ede-vsq` implement both ends; other
//! transports can be plugged in by implementing the two traits.

use ede_vsq::{QueueHead, QueueTail};

/// Producer end of a connection
pub trait SenderPort: Send {
    /// Reserve a record of `size` bytes, header included
    ///
    /// Returns `None` if the connection is blocked at the moment.
    fn allocate(&mut self, size: usize) -> Option<&mut [u8]>;

    /// Hand the record reserved last over to the receiver
    fn submit(&mut self) -> bool;
}

/// Consumer end of a connection, owned by a dispatcher
pub trait DispatcherPort: Send {
    /// Next received record, or `None` if there is none
    ///
    /// The record stays valid until the next call.
    fn read(&mut self) -> Option<&[u8]>;

    /// True if the connection lost synchronization and needs [`DispatcherPort::resync`]
    fn is_broken(&self) -> bool {
        false
    }

    /// Recover a broken connection; records in flight are lost
    fn resync(&mut self) -> bool {
        false
    }

    /// Records the producer could not deliver because the connection was full
    fn drop_count(&self, _reset: bool) -> u32 {
        0
    }
}

impl SenderPort for QueueTail {
    fn allocate(&mut self, size: usize) -> Option<&mut [u8]> {
        QueueTail::allocate(self, size)
    }

    fn submit(&mut self) -> bool {
        self.post()
    }
}

impl DispatcherPort for QueueHead {
    fn read(&mut self) -> Option<&[u8]> {
        QueueHead::read(self)
    }

    fn is_broken(&self) -> bool {
        self.is_communication_broken()
    }

    fn resync(&mut self) -> bool {
        self.acknowledge_resync()
    }

    fn drop_count(&self, reset: bool) -> u32 {
        QueueHead::drop_count(self, reset)
    }
}
