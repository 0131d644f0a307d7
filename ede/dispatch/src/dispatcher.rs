//! A single dispatcher
//!
//! One dispatcher owns its receiver ports, its event sources and its timers.
//! Nothing is shared with other dispatchers, so every dispatcher can be run
//! from its own thread or core once the system is set up.

use alloc::boxed::Box;
use alloc::vec::Vec;
use ede_core::{EdeError, EdeResult, EventHeader, EventKind, SenderHandle, TimeStamp};
use ede_mem::{alloc_table, MemoryPool, Table};

use crate::config::DispatcherConfig;
use crate::context::{Callback, Context, EventData, EventSourceIndex, Scope, Trigger};
use crate::map::HandleMap;
use crate::port::DispatcherPort;
use crate::timer::{TimerHandle, TimerList};

struct ExternalSource<S> {
    kind: EventKind,
    sender_handle: SenderHandle,
    /// Taken out while the callback runs
    callback: Option<Callback<S>>,
    data: S,
}

struct InternalSource<S> {
    data: S,
}

/// Event multiplexer driven by a periodic tick
pub struct Dispatcher<S> {
    idx: usize,
    tick: u32,
    now: TimeStamp,
    ports: Table<Box<dyn DispatcherPort>>,
    map: Box<dyn HandleMap>,
    external: Table<ExternalSource<S>>,
    internal: Table<InternalSource<S>>,
    timers: TimerList<S>,
    /// Events the ports lost, harvested at the start of every pass
    queue_full: u32,
    unmapped: u32,
    resyncs: u32,
}

impl<S> Dispatcher<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        idx: usize,
        config: &DispatcherConfig,
        max_external: usize,
        max_internal: usize,
        max_timers: usize,
        ports: Vec<Box<dyn DispatcherPort>>,
        map: Box<dyn HandleMap>,
        pool: &dyn MemoryPool,
    ) -> EdeResult<Self> {
        if ports.is_empty() || config.tick_period == 0 || config.tick_period > TimeStamp::MAX_SPAN
        {
            log::warn!(
                "dispatcher {}: needs at least one port and a positive tick",
                idx
            );
            return Err(EdeError::InvalidArgument);
        }
        let mut port_table = alloc_table(pool, ports.len())?;
        for port in ports {
            let _ = port_table.push(port);
        }
        let dispatcher = Self {
            idx,
            tick: config.tick_period,
            now: TimeStamp::ZERO,
            ports: port_table,
            map,
            external: alloc_table(pool, max_external)?,
            internal: alloc_table(pool, max_internal)?,
            timers: TimerList::new(
                config.max_timers.unwrap_or(max_timers),
                config.tick_period,
                pool,
            )?,
            queue_full: 0,
            unmapped: 0,
            resyncs: 0,
        };
        log::debug!(
            "dispatcher {} created: tick {}, {} port(s)",
            idx,
            config.tick_period,
            dispatcher.ports.len()
        );
        Ok(dispatcher)
    }

    /// Index of this dispatcher in its system
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Current dispatcher time
    pub fn now(&self) -> TimeStamp {
        self.now
    }

    pub fn tick_period(&self) -> u32 {
        self.tick
    }

    pub(crate) fn register_external(
        &mut self,
        kind: EventKind,
        sender_handle: SenderHandle,
        callback: Callback<S>,
        data: S,
    ) -> EdeResult<usize> {
        if kind.is_engine_internal() {
            return Err(EdeError::InvalidArgument);
        }
        let idx_source = self
            .external
            .push(ExternalSource {
                kind,
                sender_handle,
                callback: Some(callback),
                data,
            })
            .map_err(|_| {
                log::warn!("dispatcher {}: external source table full", self.idx);
                EdeError::CapacityExhausted
            })?;
        if !self.map.add_key_value_pair(kind, sender_handle, idx_source) {
            log::warn!(
                "dispatcher {}: handle map rejects {} {}",
                self.idx,
                kind,
                sender_handle
            );
            let _ = self.external.pop();
            return Err(EdeError::MapConflict);
        }
        log::debug!(
            "dispatcher {}: external source {} for {} {}",
            self.idx,
            idx_source,
            kind,
            sender_handle
        );

        let trigger = Trigger {
            kind: EventKind::EXTERNAL_SOURCE_INIT,
            data: EventData::Received(&[]),
            idx_port: None,
            source: EventSourceIndex::External(idx_source),
            timer: None,
        };
        let scope = Scope {
            timers: &mut self.timers,
            now: self.now,
            queue_full: &mut self.queue_full,
        };
        invoke_external(&mut self.external[idx_source], trigger, scope);
        Ok(idx_source)
    }

    pub(crate) fn register_internal<F>(&mut self, init: F, data: S) -> EdeResult<usize>
    where
        F: FnOnce(&mut Context<'_, S>),
    {
        let idx_source = self
            .internal
            .push(InternalSource { data })
            .map_err(|_| {
                log::warn!("dispatcher {}: internal source table full", self.idx);
                EdeError::CapacityExhausted
            })?;
        log::debug!("dispatcher {}: internal source {}", self.idx, idx_source);

        let trigger = Trigger {
            kind: EventKind::INTERNAL_SOURCE_INIT,
            data: EventData::Received(&[]),
            idx_port: None,
            source: EventSourceIndex::Internal(idx_source),
            timer: None,
        };
        let scope = Scope {
            timers: &mut self.timers,
            now: self.now,
            queue_full: &mut self.queue_full,
        };
        let mut ctx = Context::new(trigger, &mut self.internal[idx_source].data, scope);
        init(&mut ctx);
        if ctx.into_new_callback().is_some() {
            log::warn!("dispatcher {}: internal sources have no callback to replace", self.idx);
        }
        Ok(idx_source)
    }

    /// One tick of the dispatcher
    ///
    /// Delivers all events received meanwhile, port by port in order of
    /// appearance and in arrival order per port. Then fires the timers that
    /// became due, most overdue first and equally due ones in order of
    /// creation. Finally the dispatcher time advances by one tick.
    pub fn dispatcher_main(&mut self) {
        self.harvest_drop_counts();
        let now = self.now;

        for (idx_port, port) in self.ports.iter_mut().enumerate() {
            if port.is_broken() {
                log::warn!(
                    "dispatcher {}: port {} lost synchronization, resyncing",
                    self.idx,
                    idx_port
                );
                if port.resync() {
                    self.resyncs = self.resyncs.saturating_add(1);
                }
            }
            while let Some(record) = port.read() {
                let Some((header, payload)) = EventHeader::decode(record) else {
                    self.unmapped = self.unmapped.saturating_add(1);
                    continue;
                };
                if header.kind.is_engine_internal() {
                    log::trace!("dispatcher {}: reserved kind {} received", self.idx, header.kind);
                    self.unmapped = self.unmapped.saturating_add(1);
                    continue;
                }
                let idx_source = self
                    .map
                    .get_value(header.kind, header.sender_handle)
                    .filter(|&idx| idx < self.external.len());
                let Some(idx_source) = idx_source else {
                    log::trace!(
                        "dispatcher {}: no source for {} {}",
                        self.idx,
                        header.kind,
                        header.sender_handle
                    );
                    self.unmapped = self.unmapped.saturating_add(1);
                    continue;
                };
                log::trace!(
                    "dispatcher {}: {} to source {}",
                    self.idx,
                    header.kind,
                    idx_source
                );
                let trigger = Trigger {
                    kind: header.kind,
                    data: EventData::Received(payload),
                    idx_port: Some(idx_port),
                    source: EventSourceIndex::External(idx_source),
                    timer: None,
                };
                let scope = Scope {
                    timers: &mut self.timers,
                    now,
                    queue_full: &mut self.queue_full,
                };
                invoke_external(&mut self.external[idx_source], trigger, scope);
            }
        }

        self.timers.collect_due(now);
        let mut n = 0;
        while let Some(idx_timer) = self.timers.due_entry(n) {
            n += 1;
            let Some(firing) = self.timers.begin_fire(idx_timer, now) else {
                continue;
            };
            log::trace!(
                "dispatcher {}: timer {} elapsed at {}",
                self.idx,
                idx_timer,
                now
            );
            let source_data = match firing.root {
                EventSourceIndex::External(idx) => &mut self.external[idx].data,
                EventSourceIndex::Internal(idx) => &mut self.internal[idx].data,
            };
            let trigger = Trigger {
                kind: EventKind::TIMER_ELAPSED,
                data: EventData::Timer(firing.context),
                idx_port: None,
                source: firing.root,
                timer: Some(firing.handle),
            };
            let scope = Scope {
                timers: &mut self.timers,
                now,
                queue_full: &mut self.queue_full,
            };
            let mut callback = firing.callback;
            let mut ctx = Context::new(trigger, source_data, scope);
            callback(&mut ctx);
            let callback = ctx.into_new_callback().unwrap_or(callback);
            self.timers.end_fire(idx_timer, now, callback);
        }
        self.timers.settle();

        self.now = now.wrapping_add(self.tick);
    }

    fn harvest_drop_counts(&mut self) {
        for port in self.ports.iter() {
            self.queue_full = self.queue_full.saturating_add(port.drop_count(true));
        }
    }

    /// Events lost because the receiver ports were full (saturating)
    pub fn no_queue_full_events(&mut self, reset: bool) -> u32 {
        self.harvest_drop_counts();
        let count = self.queue_full;
        if reset {
            self.queue_full = 0;
        }
        count
    }

    /// Received records that reached no source
    ///
    /// Counts malformed records, records of the engine's reserved kinds and
    /// events the handle map could not assign.
    pub fn no_unmapped_events(&self) -> u32 {
        self.unmapped
    }

    /// Number of times a port had to be resynchronized
    pub fn no_port_resyncs(&self) -> u32 {
        self.resyncs
    }

    pub fn no_external_sources(&self) -> usize {
        self.external.len()
    }

    pub fn no_internal_sources(&self) -> usize {
        self.internal.len()
    }

    /// Number of existing timers, suspended ones included
    pub fn no_timers(&self) -> usize {
        self.timers.no_live()
    }

    pub fn is_timer_alive(&self, timer: TimerHandle) -> bool {
        self.timers.is_live(timer)
    }

    /// Kind and sender handle an external source was registered for
    pub fn external_source_key(&self, idx_source: usize) -> Option<(EventKind, SenderHandle)> {
        self.external
            .get(idx_source)
            .map(|source| (source.kind, source.sender_handle))
    }

    /// Data of an external event source
    pub fn external_source_data(&self, idx_source: usize) -> Option<&S> {
        self.external.get(idx_source).map(|source| &source.data)
    }

    /// Data of an internal event source
    pub fn internal_source_data(&self, idx_source: usize) -> Option<&S> {
        self.internal.get(idx_source).map(|source| &source.data)
    }
}

fn invoke_external<S>(source: &mut ExternalSource<S>, trigger: Trigger<'_>, scope: Scope<'_, S>) {
    let Some(mut callback) = source.callback.take() else {
        return;
    };
    let mut ctx = Context::new(trigger, &mut source.data, scope);
    callback(&mut ctx);
    source.callback = Some(ctx.into_new_callback().unwrap_or(callback));
}
