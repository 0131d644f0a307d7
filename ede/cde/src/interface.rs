//! Registration of buses and frames and posting of their events

use alloc::boxed::Box;
use alloc::vec::Vec;
use ede_core::{event_record_size, EdeError, EdeResult, EventKind};
use ede_dispatch::{
    DispatcherConfig, DispatcherPort, DispatcherSystem, HandleMap, Sender, SenderPort,
    SystemConfig,
};
use ede_mem::{alloc_table_with, MemoryPool, Table};
use ede_vsq::{create_queue, QueueTail};

use crate::config::CanConfig;
use crate::kind;
use crate::map::{
    bus_handle, frame_handle, ObjectMap, OsHandleFrameMap, BUS_HANDLE_FLAG, MAX_MAP_VALUE,
};
use crate::source::{CanContext, CanSource, FrameInfo, OsHandleFrame};

/// The CAN interface during setup
///
/// Create the dispatchers, install the OS handle map if the operating system
/// doesn't use the frame indices as handles, register buses and frames, then
/// split the interface with [`CanInterface::into_parts`].
pub struct CanInterface<'p> {
    config: CanConfig,
    pool: &'p dyn MemoryPool,
    system: DispatcherSystem<'p, CanSource>,
    /// Producer ends of the dispatcher queues, handed to the poster at the end
    tails: Table<Option<QueueTail>>,
    /// Object to dispatcher index
    routes: ObjectMap,
    buses: Table<bool>,
    no_frames: usize,
    os_map: Option<Box<dyn OsHandleFrameMap>>,
}

impl<'p> CanInterface<'p> {
    /// Create the interface
    ///
    /// Dispatcher indices and event source indices must fit the routing
    /// maps; larger configurations are an `InvalidArgument` error.
    pub fn new(config: CanConfig, pool: &'p dyn MemoryPool) -> EdeResult<Self> {
        let no_objects = config.max_buses.checked_add(config.max_frames);
        if config.no_dispatchers > MAX_MAP_VALUE || no_objects.map_or(true, |n| n > MAX_MAP_VALUE) {
            log::warn!(
                "CAN interface too large: {} dispatcher(s), {} bus(es), {} frames",
                config.no_dispatchers,
                config.max_buses,
                config.max_frames
            );
            return Err(EdeError::InvalidArgument);
        }
        let system_config = SystemConfig::builder()
            .no_dispatchers(config.no_dispatchers)
            .max_external_sources(config.max_buses + config.max_frames)
            .max_internal_sources(0)
            .max_timers(config.max_timers)
            .build();
        let interface = Self {
            config,
            pool,
            system: DispatcherSystem::new(system_config, pool)?,
            tails: alloc_table_with(pool, config.no_dispatchers, |_| None)?,
            routes: ObjectMap::new(config.max_buses, config.max_frames, pool)?,
            buses: alloc_table_with(pool, config.max_buses, |_| false)?,
            no_frames: 0,
            os_map: None,
        };
        log::debug!(
            "CAN interface: {} bus(es), up to {} frames, {} dispatcher(s)",
            config.max_buses,
            config.max_frames,
            config.no_dispatchers
        );
        Ok(interface)
    }

    /// Install the map from OS frame handles to frame indices
    ///
    /// Must happen before the first frame is registered.
    pub fn install_map_os_handle_frame_to_index<M>(&mut self, map: M) -> EdeResult<()>
    where
        M: OsHandleFrameMap + 'static,
    {
        if self.no_frames > 0 {
            log::warn!("OS handle map installed after frame registration");
            return Err(EdeError::AlreadyCreated);
        }
        self.os_map = Some(Box::new(map));
        Ok(())
    }

    /// Create dispatcher `idx_dispatcher` together with its queue
    pub fn create_dispatcher(&mut self, idx_dispatcher: usize, tick_period: u32) -> EdeResult<()> {
        let slot = self
            .tails
            .get(idx_dispatcher)
            .ok_or(EdeError::InvalidIndex)?;
        if slot.is_some() {
            return Err(EdeError::AlreadyCreated);
        }
        let (tail, head) = create_queue(
            self.config.queue_len,
            event_record_size(self.config.max_payload),
            self.pool,
        )?;
        let map = ObjectMap::new(self.config.max_buses, self.config.max_frames, self.pool)?;
        let ports: Vec<Box<dyn DispatcherPort>> = alloc::vec![Box::new(head)];
        self.system.create_dispatcher(
            idx_dispatcher,
            DispatcherConfig::with_tick(tick_period),
            ports,
            Box::new(map),
        )?;
        self.tails[idx_dispatcher] = Some(tail);
        Ok(())
    }

    /// Register bus `idx_bus` with a dispatcher
    ///
    /// The callback receives all events of the bus, the first one being
    /// [`kind::BUS_INIT`].
    pub fn register_bus<F>(&mut self, idx_bus: usize, idx_dispatcher: usize, callback: F) -> EdeResult<()>
    where
        F: FnMut(&mut CanContext<'_>) + Send + 'static,
    {
        match self.buses.get(idx_bus) {
            None => return Err(EdeError::InvalidIndex),
            Some(true) => return Err(EdeError::AlreadyCreated),
            Some(false) => {}
        }
        self.check_dispatcher(idx_dispatcher)?;
        let handle = bus_handle(idx_bus);
        self.system.register_external_event_source(
            idx_dispatcher,
            kind::BUS_INIT,
            handle,
            callback,
            CanSource::Bus { idx_bus },
        )?;
        let routed = self
            .routes
            .add_key_value_pair(kind::BUS_INIT, handle, idx_dispatcher);
        debug_assert!(routed, "dispatcher index out of the route map's range");
        self.buses[idx_bus] = true;
        log::debug!("bus {} registered with dispatcher {}", idx_bus, idx_dispatcher);
        Ok(())
    }

    /// Register a frame with a dispatcher and return its index
    ///
    /// Frames are numbered in order of registration. The callback receives
    /// all events of the frame, the first one being [`kind::FRAME_INIT`].
    /// Fails without effect if the frame table is full or the OS handle map
    /// rejects the frame.
    pub fn register_frame<F>(
        &mut self,
        can_id: u32,
        is_inbound: bool,
        idx_bus: usize,
        os_handle: OsHandleFrame,
        idx_dispatcher: usize,
        callback: F,
    ) -> EdeResult<usize>
    where
        F: FnMut(&mut CanContext<'_>) + Send + 'static,
    {
        if self.no_frames >= self.config.max_frames {
            log::warn!("frame table full, capacity is {}", self.config.max_frames);
            return Err(EdeError::CapacityExhausted);
        }
        if idx_bus >= self.config.max_buses {
            return Err(EdeError::InvalidIndex);
        }
        self.check_dispatcher(idx_dispatcher)?;

        let idx_frame = self.no_frames;
        if let Some(map) = self.os_map.as_mut() {
            if !map.make_entry(can_id, idx_bus, os_handle, idx_frame, is_inbound) {
                log::warn!("OS handle map rejects frame {:#x} on bus {}", can_id, idx_bus);
                return Err(EdeError::MapConflict);
            }
        }
        let info = FrameInfo {
            idx_frame,
            can_id,
            is_inbound,
            idx_bus,
            os_handle,
        };
        let handle = frame_handle(idx_frame);
        self.system.register_external_event_source(
            idx_dispatcher,
            kind::FRAME_INIT,
            handle,
            callback,
            CanSource::Frame(info),
        )?;
        let routed = self
            .routes
            .add_key_value_pair(kind::FRAME_INIT, handle, idx_dispatcher);
        debug_assert!(routed, "dispatcher index out of the route map's range");
        self.no_frames += 1;
        log::debug!(
            "frame {} (CAN ID {:#x}, {}) registered with dispatcher {}",
            idx_frame,
            can_id,
            if is_inbound { "in" } else { "out" },
            idx_dispatcher
        );
        Ok(idx_frame)
    }

    fn check_dispatcher(&self, idx_dispatcher: usize) -> EdeResult<()> {
        match self.tails.get(idx_dispatcher) {
            None => Err(EdeError::InvalidIndex),
            Some(None) => Err(EdeError::NotCreated),
            Some(Some(_)) => Ok(()),
        }
    }

    pub fn no_frames(&self) -> usize {
        self.no_frames
    }

    pub fn no_buses(&self) -> usize {
        self.buses.iter().filter(|&&registered| registered).count()
    }

    pub fn config(&self) -> &CanConfig {
        &self.config
    }

    /// End the setup
    ///
    /// Returns the producer side, to be used by the CAN interrupts, and the
    /// dispatchers, to be driven by the tick. Fails if a dispatcher has not
    /// been created.
    pub fn into_parts(self) -> EdeResult<(CanEventPoster, DispatcherSystem<'p, CanSource>)> {
        let mut ports: Vec<Box<dyn SenderPort>> = Vec::with_capacity(self.tails.len());
        for tail in self.tails {
            ports.push(Box::new(tail.ok_or(EdeError::NotCreated)?));
        }
        let sender = Sender::new(ports, Some(Box::new(self.routes)), self.pool)?;
        let poster = CanEventPoster {
            sender,
            os_map: self.os_map,
            no_frames: self.no_frames,
            max_payload: self.config.max_payload,
        };
        Ok((poster, self.system))
    }
}

/// Producer side of the CAN interface
///
/// Used from the contexts that learn about bus activity, typically the CAN
/// interrupts. Events of all objects of one dispatcher share a queue, so all
/// of them must be posted from the same context.
pub struct CanEventPoster {
    sender: Sender,
    os_map: Option<Box<dyn OsHandleFrameMap>>,
    no_frames: usize,
    max_payload: usize,
}

impl CanEventPoster {
    /// Post an event for a bus
    ///
    /// Returns `false` if the bus is not registered, the payload is too large
    /// or the queue is full. Only the latter is counted.
    pub fn post_bus_event(&mut self, idx_bus: usize, kind: EventKind, data: &[u8]) -> bool {
        if !self.is_postable(kind, data) || idx_bus >= BUS_HANDLE_FLAG as usize {
            return false;
        }
        self.sender.post_event(kind, bus_handle(idx_bus), data)
    }

    /// Post an event for the frame known to the operating system as
    /// `os_handle` on bus `idx_bus`
    ///
    /// Returns `false` if the frame is unknown, the payload is too large or
    /// the queue is full. Only the latter is counted.
    pub fn post_frame_event(
        &mut self,
        idx_bus: usize,
        os_handle: OsHandleFrame,
        kind: EventKind,
        data: &[u8],
    ) -> bool {
        if !self.is_postable(kind, data) {
            return false;
        }
        let idx_frame = match &self.os_map {
            Some(map) => match map.idx_frame(idx_bus, os_handle) {
                Some(idx_frame) => idx_frame,
                None => return false,
            },
            None => os_handle as usize,
        };
        if idx_frame >= self.no_frames {
            return false;
        }
        self.sender.post_event(kind, frame_handle(idx_frame), data)
    }

    fn is_postable(&self, kind: EventKind, data: &[u8]) -> bool {
        !kind.is_engine_internal() && data.len() <= self.max_payload
    }

    /// Events lost because the queue of dispatcher `idx_dispatcher` was full
    ///
    /// The producer-side count; wraps around.
    pub fn no_blocked_events(&self, idx_dispatcher: usize) -> u32 {
        self.sender.no_sender_port_blocked_events(idx_dispatcher)
    }
}
