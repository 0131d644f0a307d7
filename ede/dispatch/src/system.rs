//! The dispatcher system
//!
//! Setup happens in two phases. First the system is created and its
//! dispatchers are bound to their ports; then event sources are registered.
//! Both phases draw memory from the pool. Afterwards the dispatchers run,
//! either through [`DispatcherSystem::dispatcher_main`] or, moved out with
//! [`DispatcherSystem::into_dispatchers`], each on its own thread.

use alloc::boxed::Box;
use alloc::vec::Vec;
use ede_core::{EdeError, EdeResult, EventKind, SenderHandle};
use ede_mem::{alloc_table_with, MemoryPool, Table};

use crate::config::{DispatcherConfig, SystemConfig};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::map::HandleMap;
use crate::port::DispatcherPort;

/// A fixed set of dispatchers sharing one memory pool during setup
///
/// `S` is the data every event source carries; callbacks get access to the
/// data of the source they work for.
pub struct DispatcherSystem<'p, S> {
    config: SystemConfig,
    pool: &'p dyn MemoryPool,
    dispatchers: Table<Option<Dispatcher<S>>>,
}

impl<'p, S> DispatcherSystem<'p, S> {
    /// Create a system of `config.no_dispatchers` not yet created dispatchers
    pub fn new(config: SystemConfig, pool: &'p dyn MemoryPool) -> EdeResult<Self> {
        if config.no_dispatchers == 0 {
            log::warn!("dispatcher system without dispatchers");
            return Err(EdeError::InvalidArgument);
        }
        let dispatchers = alloc_table_with(pool, config.no_dispatchers, |_| None)?;
        log::debug!(
            "dispatcher system: {} dispatcher(s), {} external / {} internal sources, {} timers each",
            config.no_dispatchers,
            config.max_external_sources,
            config.max_internal_sources,
            config.max_timers
        );
        Ok(Self {
            config,
            pool,
            dispatchers,
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Bind dispatcher `idx` to its receiver ports
    ///
    /// `map` translates the sender handles of received events into the
    /// indices of the external event sources registered with this dispatcher.
    pub fn create_dispatcher(
        &mut self,
        idx: usize,
        config: DispatcherConfig,
        ports: Vec<Box<dyn DispatcherPort>>,
        map: Box<dyn HandleMap>,
    ) -> EdeResult<()> {
        let slot = self.dispatchers.get_mut(idx).ok_or(EdeError::InvalidIndex)?;
        if slot.is_some() {
            return Err(EdeError::AlreadyCreated);
        }
        *slot = Some(Dispatcher::new(
            idx,
            &config,
            self.config.max_external_sources,
            self.config.max_internal_sources,
            self.config.max_timers,
            ports,
            map,
            self.pool,
        )?);
        Ok(())
    }

    /// Register a source of events received through the ports of dispatcher
    /// `idx_dispatcher`
    ///
    /// The handle map of the dispatcher learns that events of `kind` with
    /// `sender_handle` belong to the new source. The callback is invoked once
    /// right away with [`EventKind::EXTERNAL_SOURCE_INIT`]. On failure the
    /// source table is unchanged.
    pub fn register_external_event_source<F>(
        &mut self,
        idx_dispatcher: usize,
        kind: EventKind,
        sender_handle: SenderHandle,
        callback: F,
        data: S,
    ) -> EdeResult<usize>
    where
        F: FnMut(&mut Context<'_, S>) + Send + 'static,
    {
        self.dispatcher_mut(idx_dispatcher)?.register_external(
            kind,
            sender_handle,
            Box::new(callback),
            data,
        )
    }

    /// Register a source that only lives on events of the dispatcher itself
    ///
    /// `init` is invoked once with [`EventKind::INTERNAL_SOURCE_INIT`]; it
    /// typically creates the timers the source runs on.
    pub fn register_internal_event_source<F>(
        &mut self,
        idx_dispatcher: usize,
        init: F,
        data: S,
    ) -> EdeResult<usize>
    where
        F: FnOnce(&mut Context<'_, S>),
    {
        self.dispatcher_mut(idx_dispatcher)?
            .register_internal(init, data)
    }

    /// Run one tick of dispatcher `idx`
    pub fn dispatcher_main(&mut self, idx: usize) -> EdeResult<()> {
        self.dispatcher_mut(idx)?.dispatcher_main();
        Ok(())
    }

    /// Events lost because the ports of dispatcher `idx` were full
    pub fn no_queue_full_events(&mut self, idx: usize, reset: bool) -> u32 {
        self.dispatcher_mut(idx)
            .map_or(0, |dispatcher| dispatcher.no_queue_full_events(reset))
    }

    pub fn dispatcher(&self, idx: usize) -> Option<&Dispatcher<S>> {
        self.dispatchers.get(idx)?.as_ref()
    }

    pub fn dispatcher_mut(&mut self, idx: usize) -> EdeResult<&mut Dispatcher<S>> {
        self.dispatchers
            .get_mut(idx)
            .ok_or(EdeError::InvalidIndex)?
            .as_mut()
            .ok_or(EdeError::NotCreated)
    }

    /// Move the dispatchers out of the system, e.g. to run them on
    /// different threads
    ///
    /// Fails if any dispatcher has not been created.
    pub fn into_dispatchers(self) -> EdeResult<Vec<Dispatcher<S>>> {
        self.dispatchers
            .into_iter()
            .map(|dispatcher| dispatcher.ok_or(EdeError::NotCreated))
            .collect()
    }
}
