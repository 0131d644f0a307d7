#![no_std]
#![forbid(unsafe_code)]

//! # EDE CAN Dispatch Layer
//!
//! Registers CAN buses and frames as event sources of the dispatcher engine.
//! The CAN interrupts post bus and frame events through a [`CanEventPoster`];
//! the dispatchers deliver them to the callbacks of the bus or frame, which
//! learn about their object through [`CanContextExt`].

extern crate alloc;

pub mod config;
pub mod interface;
pub mod map;
pub mod source;

pub use config::{CanConfig, CanConfigBuilder};
pub use interface::{CanEventPoster, CanInterface};
pub use map::{ObjectMap, OsHandleFrameMap, OsHandleTable, BUS_HANDLE_FLAG};
pub use source::{CanContext, CanContextExt, CanSource, FrameInfo, OsHandleFrame};

/// Kinds of CAN events
///
/// Values up to [`kind::LAST_PREDEFINED`] are reserved; application specific
/// events start at [`kind::FIRST_CUSTOM`].
pub mod kind {
    use ede_core::EventKind;

    pub const INVALID: EventKind = EventKind::new(1);
    /// First event of every bus
    pub const BUS_INIT: EventKind = EventKind::new(2);
    /// First event of every frame
    pub const FRAME_INIT: EventKind = EventKind::new(3);
    pub const TIMER_ELAPSED: EventKind = EventKind::new(4);
    pub const FRAME_RECEPTION: EventKind = EventKind::new(5);
    pub const SEND_ACKNOWLEDGE: EventKind = EventKind::new(6);
    pub const FRAME_ERROR: EventKind = EventKind::new(7);
    pub const LAST_PREDEFINED: EventKind = EventKind::new(99);
    pub const FIRST_CUSTOM: EventKind = EventKind::new(100);
}
