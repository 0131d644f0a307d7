//! Kinds of events and sender handles

use core::fmt;

/// Type-safe kind of event
///
/// The low range up to [`EventKind::LAST_PREDEFINED`] is reserved for the
/// framework and its specializations; applications number their own kinds
/// from [`EventKind::FIRST_CUSTOM`]. The engine's own kinds live at the very
/// top of the range so they never collide with either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKind(pub u32);

impl EventKind {
    /// End of the range reserved for predefined kinds
    pub const LAST_PREDEFINED: EventKind = EventKind(99);
    /// First kind available to application code
    pub const FIRST_CUSTOM: EventKind = EventKind(100);

    /// Last kind a producer may put into a queue
    pub const LAST: EventKind = EventKind(u32::MAX - 5);
    /// Synthetic event delivered once to a newly registered external source
    pub const EXTERNAL_SOURCE_INIT: EventKind = EventKind(u32::MAX - 4);
    /// Synthetic event delivered once to a newly registered internal source
    pub const INTERNAL_SOURCE_INIT: EventKind = EventKind(u32::MAX - 3);
    /// A timer became due
    pub const TIMER_ELAPSED: EventKind = EventKind(u32::MAX - 2);

    /// Create a new kind from a raw value
    pub const fn new(kind: u32) -> Self {
        EventKind(kind)
    }

    /// Get the raw kind value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for the kinds the engine synthesizes itself
    pub const fn is_engine_internal(self) -> bool {
        self.0 > Self::LAST.0
    }

    /// True for the kinds reserved below [`EventKind::FIRST_CUSTOM`]
    pub const fn is_predefined(self) -> bool {
        self.0 <= Self::LAST_PREDEFINED.0
    }
}

impl From<u32> for EventKind {
    fn from(kind: u32) -> Self {
        EventKind(kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EventKind::EXTERNAL_SOURCE_INIT => write!(f, "EventKind(EXT_INIT)"),
            EventKind::INTERNAL_SOURCE_INIT => write!(f, "EventKind(INT_INIT)"),
            EventKind::TIMER_ELAPSED => write!(f, "EventKind(TIMER)"),
            EventKind(raw) => write!(f, "EventKind({})", raw),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventKind {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "EventKind({})", self.0);
    }
}

/// Producer-side handle that travels with an event
///
/// Its meaning is private to the producer and the handle maps; the engine
/// only passes it on for lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SenderHandle(pub u32);

impl SenderHandle {
    /// Create a new handle from a raw value
    pub const fn new(handle: u32) -> Self {
        SenderHandle(handle)
    }

    /// Get the raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SenderHandle {
    fn from(handle: u32) -> Self {
        SenderHandle(handle)
    }
}

impl fmt::Display for SenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderHandle({:#x})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SenderHandle {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "SenderHandle({=u32:#x})", self.0);
    }
}
