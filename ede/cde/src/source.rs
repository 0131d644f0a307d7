//! Buses and frames as seen from their callbacks

use ede_core::EventKind;
use ede_dispatch::Context;

use crate::kind;

/// Handle the operating system uses for a frame, e.g. a mailbox number
pub type OsHandleFrame = u32;

/// Properties of a registered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub idx_frame: usize,
    /// CAN ID; extended IDs carry [`CAN_ID_EXTENDED_FLAG`](ede_dispatch::CAN_ID_EXTENDED_FLAG)
    pub can_id: u32,
    pub is_inbound: bool,
    pub idx_bus: usize,
    pub os_handle: OsHandleFrame,
}

/// The CAN object behind an event source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanSource {
    Bus { idx_bus: usize },
    Frame(FrameInfo),
}

impl CanSource {
    fn frame(&self) -> Option<&FrameInfo> {
        match self {
            CanSource::Frame(info) => Some(info),
            CanSource::Bus { .. } => None,
        }
    }
}

/// Callback context of the CAN layer
pub type CanContext<'a> = Context<'a, CanSource>;

/// CAN view of a callback context
///
/// Works alike in bus, frame and timer callbacks; a timer reports the bus or
/// frame it was created for. The frame getters return `None` for buses.
pub trait CanContextExt {
    /// Kind of event in terms of the CAN layer
    ///
    /// The engine's initialization and timer events appear as
    /// [`kind::BUS_INIT`], [`kind::FRAME_INIT`] and [`kind::TIMER_ELAPSED`].
    fn can_kind(&self) -> EventKind;

    fn can_id(&self) -> Option<u32>;

    fn idx_frame(&self) -> Option<usize>;

    /// Bus of the frame, or the bus itself
    fn idx_bus(&self) -> usize;

    fn os_handle_frame(&self) -> Option<OsHandleFrame>;

    /// True for frames received from the bus, false for frames sent
    fn is_inbound_transmission(&self) -> Option<bool>;
}

impl CanContextExt for Context<'_, CanSource> {
    fn can_kind(&self) -> EventKind {
        match self.kind() {
            EventKind::EXTERNAL_SOURCE_INIT => match self.source_data() {
                CanSource::Bus { .. } => kind::BUS_INIT,
                CanSource::Frame(_) => kind::FRAME_INIT,
            },
            EventKind::TIMER_ELAPSED => kind::TIMER_ELAPSED,
            EventKind::INTERNAL_SOURCE_INIT => kind::INVALID,
            other => other,
        }
    }

    fn can_id(&self) -> Option<u32> {
        self.source_data().frame().map(|info| info.can_id)
    }

    fn idx_frame(&self) -> Option<usize> {
        self.source_data().frame().map(|info| info.idx_frame)
    }

    fn idx_bus(&self) -> usize {
        match self.source_data() {
            CanSource::Bus { idx_bus } => *idx_bus,
            CanSource::Frame(info) => info.idx_bus,
        }
    }

    fn os_handle_frame(&self) -> Option<OsHandleFrame> {
        self.source_data().frame().map(|info| info.os_handle)
    }

    fn is_inbound_transmission(&self) -> Option<bool> {
        self.source_data().frame().map(|info| info.is_inbound)
    }
}
