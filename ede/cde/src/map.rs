//! Handle translation of the CAN layer
//!
//! Buses and frames travel through the dispatcher queues as sender handles.
//! Frames use their index, buses their index with [`BUS_HANDLE_FLAG`] set. The
//! same [`ObjectMap`] type routes a handle to the dispatcher on the sender
//! side and to the event source within each dispatcher.

use ede_core::{EdeError, EdeResult, EventKind, SenderHandle};
use ede_dispatch::HandleMap;
use ede_mem::{alloc_table, alloc_table_with, MemoryPool, Table};

use crate::source::OsHandleFrame;

/// Marks the sender handle of a bus
pub const BUS_HANDLE_FLAG: u32 = 0x8000_0000;

const INVALID_VALUE: u16 = u16::MAX;

/// Values an [`ObjectMap`] stores must stay below this bound
pub(crate) const MAX_MAP_VALUE: usize = INVALID_VALUE as usize;

pub(crate) fn frame_handle(idx_frame: usize) -> SenderHandle {
    SenderHandle::new(idx_frame as u32)
}

pub(crate) fn bus_handle(idx_bus: usize) -> SenderHandle {
    SenderHandle::new(idx_bus as u32 | BUS_HANDLE_FLAG)
}

/// Map from bus and frame handles to small indices
///
/// The kind of event is not evaluated: all events of an object take the same
/// route.
#[derive(Debug)]
pub struct ObjectMap {
    buses: Table<u16>,
    frames: Table<u16>,
}

impl ObjectMap {
    pub fn new(max_buses: usize, max_frames: usize, pool: &dyn MemoryPool) -> EdeResult<Self> {
        Ok(Self {
            buses: alloc_table_with(pool, max_buses, |_| INVALID_VALUE)?,
            frames: alloc_table_with(pool, max_frames, |_| INVALID_VALUE)?,
        })
    }

    fn slot(&self, handle: SenderHandle) -> Option<(bool, usize)> {
        let raw = handle.raw();
        if raw & BUS_HANDLE_FLAG != 0 {
            let idx = (raw & !BUS_HANDLE_FLAG) as usize;
            (idx < self.buses.len()).then_some((true, idx))
        } else {
            let idx = raw as usize;
            (idx < self.frames.len()).then_some((false, idx))
        }
    }
}

impl HandleMap for ObjectMap {
    fn add_key_value_pair(&mut self, _: EventKind, handle: SenderHandle, value: usize) -> bool {
        if value >= INVALID_VALUE as usize {
            return false;
        }
        let Some((is_bus, idx)) = self.slot(handle) else {
            return false;
        };
        let stored = if is_bus {
            &mut self.buses[idx]
        } else {
            &mut self.frames[idx]
        };
        if *stored != INVALID_VALUE && *stored as usize != value {
            return false;
        }
        *stored = value as u16;
        true
    }

    fn get_value(&self, _: EventKind, handle: SenderHandle) -> Option<usize> {
        let (is_bus, idx) = self.slot(handle)?;
        let value = if is_bus {
            self.buses[idx]
        } else {
            self.frames[idx]
        };
        (value != INVALID_VALUE).then_some(value as usize)
    }
}

/// Integrator supplied map from the operating system's frame handles to the
/// frame indices of the CAN layer
///
/// Entries are made while frames are registered; lookups happen in the
/// producer context for every posted frame event.
pub trait OsHandleFrameMap: Send {
    /// Learn the frame index of a frame
    ///
    /// Returns `false` if the map is full; the registration fails then.
    fn make_entry(
        &mut self,
        can_id: u32,
        idx_bus: usize,
        os_handle: OsHandleFrame,
        idx_frame: usize,
        is_inbound: bool,
    ) -> bool;

    /// Frame index of an OS handle on a bus
    fn idx_frame(&self, idx_bus: usize, os_handle: OsHandleFrame) -> Option<usize>;
}

/// A simple [`OsHandleFrameMap`] for moderate numbers of frames
///
/// Entries are kept sorted by bus and handle and looked up with a binary
/// search.
#[derive(Debug)]
pub struct OsHandleTable {
    entries: Table<(usize, OsHandleFrame, u16)>,
}

impl OsHandleTable {
    pub fn new(capacity: usize, pool: &dyn MemoryPool) -> EdeResult<Self> {
        if capacity > INVALID_VALUE as usize {
            return Err(EdeError::InvalidArgument);
        }
        Ok(Self {
            entries: alloc_table(pool, capacity)?,
        })
    }

    fn search(&self, idx_bus: usize, os_handle: OsHandleFrame) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|&(bus, handle, _)| (bus, handle).cmp(&(idx_bus, os_handle)))
    }
}

impl OsHandleFrameMap for OsHandleTable {
    fn make_entry(
        &mut self,
        _can_id: u32,
        idx_bus: usize,
        os_handle: OsHandleFrame,
        idx_frame: usize,
        _is_inbound: bool,
    ) -> bool {
        if idx_frame >= INVALID_VALUE as usize {
            return false;
        }
        let Err(pos) = self.search(idx_bus, os_handle) else {
            log::warn!("OS handle {} of bus {} is already in use", os_handle, idx_bus);
            return false;
        };
        if self.entries.push((idx_bus, os_handle, idx_frame as u16)).is_err() {
            return false;
        }
        self.entries[pos..].rotate_right(1);
        true
    }

    fn idx_frame(&self, idx_bus: usize, os_handle: OsHandleFrame) -> Option<usize> {
        let pos = self.search(idx_bus, os_handle).ok()?;
        Some(self.entries[pos].2 as usize)
    }
}
