#![no_std]
#![forbid(unsafe_code)]

//! # EDE Core
//!
//! Core types shared by the event dispatcher engine crates: the error type,
//! kinds of events, sender handles, the wraparound-safe time base and the
//! layout of the event records that travel through the dispatcher queues.

use core::fmt;

pub mod events;
pub mod record;
pub mod time;

pub use events::*;
pub use record::*;
pub use time::*;

/// EDE framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the EDE crates
pub type EdeResult<T> = Result<T, EdeError>;

/// Error types for EDE setup and registration operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdeError {
    /// The queue has no room for the element
    QueueFull,
    /// Queue dimensions do not fit the element link representation
    InvalidGeometry,
    /// The queue tail already has its reader end
    AlreadyLinked,
    /// The memory pool cannot satisfy the request
    OutOfMemory,
    /// A fixed-capacity table is full
    CapacityExhausted,
    /// An index does not address an existing object
    InvalidIndex,
    /// The object at this index has already been created
    AlreadyCreated,
    /// The object at this index has not been created yet
    NotCreated,
    /// A parameter is outside its permitted range
    InvalidArgument,
    /// The handle map refused the key-value pair
    MapConflict,
}

impl fmt::Display for EdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdeError::QueueFull => write!(f, "Queue is full"),
            EdeError::InvalidGeometry => write!(f, "Queue geometry exceeds the index range"),
            EdeError::AlreadyLinked => write!(f, "Queue tail is already linked with a head"),
            EdeError::OutOfMemory => write!(f, "Memory pool exhausted"),
            EdeError::CapacityExhausted => write!(f, "Table capacity exhausted"),
            EdeError::InvalidIndex => write!(f, "Invalid index"),
            EdeError::AlreadyCreated => write!(f, "Object has already been created"),
            EdeError::NotCreated => write!(f, "Object has not been created"),
            EdeError::InvalidArgument => write!(f, "Invalid argument"),
            EdeError::MapConflict => write!(f, "Handle map rejected the key-value pair"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for EdeError {}

#[cfg(feature = "defmt")]
impl defmt::Format for EdeError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            EdeError::QueueFull => defmt::write!(fmt, "QueueFull"),
            EdeError::InvalidGeometry => defmt::write!(fmt, "InvalidGeometry"),
            EdeError::AlreadyLinked => defmt::write!(fmt, "AlreadyLinked"),
            EdeError::OutOfMemory => defmt::write!(fmt, "OutOfMemory"),
            EdeError::CapacityExhausted => defmt::write!(fmt, "CapacityExhausted"),
            EdeError::InvalidIndex => defmt::write!(fmt, "InvalidIndex"),
            EdeError::AlreadyCreated => defmt::write!(fmt, "AlreadyCreated"),
            EdeError::NotCreated => defmt::write!(fmt, "NotCreated"),
            EdeError::InvalidArgument => defmt::write!(fmt, "InvalidArgument"),
            EdeError::MapConflict => defmt::write!(fmt, "MapConflict"),
        }
    }
}
