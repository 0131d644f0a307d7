//! Maps from sender handles to dispatcher indices
//!
//! A producer identifies an event by its kind and a sender handle that only
//! means something to the producer, e.g. a mailbox number of a bus driver.
//! The dispatcher needs the index of the event source that was registered for
//! it, and the sender needs the index of the port to use. A [`HandleMap`]
//! translates between the two. Entries are made while event sources are
//! registered; lookups happen for every event.
//!
//! Every kind of event has its own, independent handle space.

use ede_core::{EdeError, EdeResult, EventKind, SenderHandle};
use ede_mem::{alloc_table, alloc_table_with, MemoryPool, Table};

/// Translation of `(kind, sender handle)` into an index
pub trait HandleMap: Send {
    /// Learn a new key-value pair
    ///
    /// Returns `false` if the pair can't be represented or contradicts an
    /// earlier one. The registration that requested the entry fails then.
    fn add_key_value_pair(&mut self, kind: EventKind, handle: SenderHandle, value: usize)
        -> bool;

    /// Look up the value for a key; `None` for unknown keys
    fn get_value(&self, kind: EventKind, handle: SenderHandle) -> Option<usize>;
}

/// Map for producers that already use the dispatcher's indices as handles
///
/// Only pairs whose value equals the handle are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMap;

impl HandleMap for IdentityMap {
    fn add_key_value_pair(&mut self, _: EventKind, handle: SenderHandle, value: usize) -> bool {
        handle.raw() as usize == value
    }

    fn get_value(&self, _: EventKind, handle: SenderHandle) -> Option<usize> {
        Some(handle.raw() as usize)
    }
}

const INVALID_VALUE: u16 = u16::MAX;
const MAX_TABLE_AREA: usize = u16::MAX as usize;

/// Handle space of one kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRange {
    /// The kind stands for itself; the handle is not evaluated
    Unused,
    /// Handles `min..=max` are in use
    Range { min: u32, max: u32 },
}

#[derive(Debug, Clone, Copy)]
struct LookupInstance {
    range: HandleRange,
    /// Start of this kind's section of the table area
    base: usize,
    simple_value: u16,
}

/// Direct lookup table per kind of event
///
/// Cheap and constant time, but the memory grows with the spread of the
/// handle range. Values are limited to 16 bits.
#[derive(Debug)]
pub struct DirectLookupMap {
    instances: Table<LookupInstance>,
    area: Table<u16>,
}

impl DirectLookupMap {
    /// Create the map; `ranges[k]` describes the handles of kind `k`
    pub fn new(ranges: &[HandleRange], pool: &dyn MemoryPool) -> EdeResult<Self> {
        let mut size_of_area = 0usize;
        let mut instances = alloc_table(pool, ranges.len())?;
        for range in ranges {
            let base = size_of_area;
            if let HandleRange::Range { min, max } = *range {
                if max < min {
                    log::warn!("handle map: empty range {}..={}", min, max);
                    return Err(EdeError::InvalidArgument);
                }
                size_of_area += (max - min) as usize + 1;
            }
            if size_of_area >= MAX_TABLE_AREA {
                log::warn!("handle map: lookup tables exceed {} entries", MAX_TABLE_AREA);
                return Err(EdeError::InvalidArgument);
            }
            let _ = instances.push(LookupInstance {
                range: *range,
                base,
                simple_value: INVALID_VALUE,
            });
        }
        let area = alloc_table_with(pool, size_of_area, |_| INVALID_VALUE)?;
        Ok(Self { instances, area })
    }

    fn slot(&self, kind: EventKind, handle: SenderHandle) -> Option<Result<usize, usize>> {
        let inst = self.instances.get(kind.raw() as usize)?;
        match inst.range {
            HandleRange::Unused => Some(Err(kind.raw() as usize)),
            HandleRange::Range { min, max } => {
                let handle = handle.raw();
                if handle < min || handle > max {
                    return None;
                }
                Some(Ok(inst.base + (handle - min) as usize))
            }
        }
    }
}

impl HandleMap for DirectLookupMap {
    fn add_key_value_pair(
        &mut self,
        kind: EventKind,
        handle: SenderHandle,
        value: usize,
    ) -> bool {
        if value >= INVALID_VALUE as usize {
            return false;
        }
        let value = value as u16;
        let stored = match self.slot(kind, handle) {
            None => return false,
            Some(Ok(idx_area)) => &mut self.area[idx_area],
            Some(Err(idx_inst)) => &mut self.instances[idx_inst].simple_value,
        };
        if *stored != INVALID_VALUE && *stored != value {
            return false;
        }
        *stored = value;
        true
    }

    fn get_value(&self, kind: EventKind, handle: SenderHandle) -> Option<usize> {
        let value = match self.slot(kind, handle)? {
            Ok(idx_area) => self.area[idx_area],
            Err(idx_inst) => self.instances[idx_inst].simple_value,
        };
        (value != INVALID_VALUE).then_some(value as usize)
    }
}

/// How [`OffsetMap`] treats one kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// The kind stands for itself and maps to one value
    Simple,
    /// `value = handle + offset`, the offset learned from the first pair
    Offset,
}

#[derive(Debug, Clone, Copy)]
struct OffsetConstant {
    mode: MappingMode,
    constant: Option<i64>,
}

/// Map with a single constant per kind of event
///
/// Needs no memory beyond one word per kind. Fits producers whose handles
/// are assigned in the same order as the dispatcher's indices.
#[derive(Debug)]
pub struct OffsetMap {
    constants: Table<OffsetConstant>,
}

impl OffsetMap {
    /// Create the map; `modes[k]` is the mapping of kind `k`
    pub fn new(modes: &[MappingMode], pool: &dyn MemoryPool) -> EdeResult<Self> {
        let mut constants = alloc_table(pool, modes.len())?;
        for &mode in modes {
            let _ = constants.push(OffsetConstant {
                mode,
                constant: None,
            });
        }
        Ok(Self { constants })
    }
}

impl HandleMap for OffsetMap {
    fn add_key_value_pair(
        &mut self,
        kind: EventKind,
        handle: SenderHandle,
        value: usize,
    ) -> bool {
        let Some(entry) = self.constants.get_mut(kind.raw() as usize) else {
            return false;
        };
        let wanted = match entry.mode {
            MappingMode::Simple => value as i64,
            MappingMode::Offset => value as i64 - i64::from(handle.raw()),
        };
        match entry.constant {
            None => {
                entry.constant = Some(wanted);
                true
            }
            Some(constant) => constant == wanted,
        }
    }

    fn get_value(&self, kind: EventKind, handle: SenderHandle) -> Option<usize> {
        let entry = self.constants.get(kind.raw() as usize)?;
        let constant = entry.constant?;
        match entry.mode {
            MappingMode::Simple => Some(constant as usize),
            MappingMode::Offset => usize::try_from(i64::from(handle.raw()) + constant).ok(),
        }
    }
}

/// Bit marking a 29-bit extended CAN identifier in a sender handle
pub const CAN_ID_EXTENDED_FLAG: u32 = 0x8000_0000;

/// Number of 11-bit standard CAN identifiers
pub const NO_STD_CAN_IDS: usize = 0x800;

/// Mapping of one kind of event in a [`CanIdMap`]
#[derive(Debug, Clone, Copy)]
pub enum CanIdKind {
    /// The kind stands for itself; the value is learned at registration
    Simple,
    /// The handle is a CAN identifier
    ///
    /// `by_can_id` is sorted by identifier. `std_lookup`, if present, holds
    /// the index of every standard identifier directly (`u16::MAX` for
    /// unused ones) and spares the binary search for those.
    CanId {
        by_can_id: &'static [(u32, u16)],
        std_lookup: Option<&'static [u16; NO_STD_CAN_IDS]>,
    },
}

#[derive(Debug, Clone, Copy)]
struct CanIdInstance {
    kind: CanIdKind,
    simple_value: Option<usize>,
}

/// Map from CAN identifiers to frame indices, backed by constant tables
///
/// The tables are typically generated from the network database, so the map
/// can't learn pairs: [`HandleMap::add_key_value_pair`] only checks that the
/// tables agree with the registration.
#[derive(Debug)]
pub struct CanIdMap {
    instances: Table<CanIdInstance>,
}

impl CanIdMap {
    /// Create the map; `kinds[k]` is the mapping of kind `k`
    pub fn new(kinds: &[CanIdKind], pool: &dyn MemoryPool) -> EdeResult<Self> {
        let mut instances = alloc_table(pool, kinds.len())?;
        for &kind in kinds {
            if let CanIdKind::CanId { by_can_id, .. } = kind {
                if by_can_id.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                    log::warn!("CAN ID map: table not strictly sorted");
                    return Err(EdeError::InvalidArgument);
                }
            }
            let _ = instances.push(CanIdInstance {
                kind,
                simple_value: None,
            });
        }
        Ok(Self { instances })
    }
}

fn lookup_can_id(
    by_can_id: &[(u32, u16)],
    std_lookup: Option<&[u16; NO_STD_CAN_IDS]>,
    can_id: u32,
) -> Option<usize> {
    if can_id & CAN_ID_EXTENDED_FLAG == 0 {
        if let Some(table) = std_lookup {
            let value = *table.get(can_id as usize)?;
            return (value != u16::MAX).then_some(value as usize);
        }
    }
    by_can_id
        .binary_search_by_key(&can_id, |&(id, _)| id)
        .ok()
        .map(|pos| by_can_id[pos].1 as usize)
}

impl HandleMap for CanIdMap {
    fn add_key_value_pair(
        &mut self,
        kind: EventKind,
        handle: SenderHandle,
        value: usize,
    ) -> bool {
        let Some(inst) = self.instances.get_mut(kind.raw() as usize) else {
            return false;
        };
        match inst.kind {
            CanIdKind::Simple => match inst.simple_value {
                None => {
                    inst.simple_value = Some(value);
                    true
                }
                Some(known) => known == value,
            },
            CanIdKind::CanId {
                by_can_id,
                std_lookup,
            } => lookup_can_id(by_can_id, std_lookup, handle.raw()) == Some(value),
        }
    }

    fn get_value(&self, kind: EventKind, handle: SenderHandle) -> Option<usize> {
        let inst = self.instances.get(kind.raw() as usize)?;
        match inst.kind {
            CanIdKind::Simple => inst.simple_value,
            CanIdKind::CanId {
                by_can_id,
                std_lookup,
            } => lookup_can_id(by_can_id, std_lookup, handle.raw()),
        }
    }
}
