//! Event sender
//!
//! Producer-side API that turns `(kind, handle, payload)` into an event record
//! and puts it into one of its ports. A full port never blocks the producer:
//! the event is dropped and counted, because producers are typically
//! interrupt handlers that must not wait.

use alloc::boxed::Box;
use alloc::vec::Vec;
use ede_core::{event_record_size, EdeError, EdeResult, EventHeader, EventKind, SenderHandle};
use ede_mem::{alloc_table, MemoryPool, Table};

use crate::map::HandleMap;
use crate::port::SenderPort;

struct PortEntry {
    port: Box<dyn SenderPort>,
    /// Events dropped because the port was blocked; wraps around
    blocked: u32,
}

/// Producer of events for one or more dispatchers
pub struct Sender {
    ports: Table<PortEntry>,
    map: Option<Box<dyn HandleMap>>,
}

impl Sender {
    /// Create a sender over `ports`
    ///
    /// `map` resolves the sender handle of an event to the port index. It may
    /// only be omitted if there is a single port.
    pub fn new(
        ports: Vec<Box<dyn SenderPort>>,
        map: Option<Box<dyn HandleMap>>,
        pool: &dyn MemoryPool,
    ) -> EdeResult<Self> {
        let mut table = alloc_table(pool, ports.len())?;
        for port in ports {
            let _ = table.push(PortEntry { port, blocked: 0 });
        }
        if table.is_empty() {
            log::warn!("sender without ports");
            return Err(EdeError::InvalidArgument);
        }
        if table.len() > 1 && map.is_none() {
            log::warn!("sender with {} ports needs a handle map", table.len());
            return Err(EdeError::InvalidArgument);
        }
        log::debug!("sender created with {} port(s)", table.len());
        Ok(Self { ports: table, map })
    }

    /// Number of ports
    pub fn no_ports(&self) -> usize {
        self.ports.len()
    }

    /// Send an event to the port the handle map selects
    ///
    /// Returns `false` if the map doesn't know the event, the kind is one of
    /// the engine's own or the port is blocked. Only the latter is counted.
    pub fn post_event(&mut self, kind: EventKind, handle: SenderHandle, data: &[u8]) -> bool {
        let idx_port = match &self.map {
            Some(map) => match map.get_value(kind, handle) {
                Some(idx) => idx,
                None => return false,
            },
            None => 0,
        };
        self.post_event_to_port(idx_port, kind, handle, data)
    }

    /// Send an event to a known port, bypassing the handle map
    ///
    /// Kinds reserved for the engine are refused without counting.
    pub fn post_event_to_port(
        &mut self,
        idx_port: usize,
        kind: EventKind,
        handle: SenderHandle,
        data: &[u8],
    ) -> bool {
        if kind.is_engine_internal() {
            return false;
        }
        let Some(entry) = self.ports.get_mut(idx_port) else {
            return false;
        };
        let header = EventHeader::new(kind, handle);
        match entry.port.allocate(event_record_size(data.len())) {
            Some(record) => header.encode(data, record) && entry.port.submit(),
            None => {
                entry.blocked = entry.blocked.wrapping_add(1);
                false
            }
        }
    }

    /// Events lost at port `idx_port` because it was blocked
    ///
    /// The counter wraps around. Returns 0 for a bad index.
    pub fn no_sender_port_blocked_events(&self, idx_port: usize) -> u32 {
        self.ports
            .get(idx_port)
            .map_or(0, |entry| entry.blocked)
    }
}
