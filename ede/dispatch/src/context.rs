//! Callback context
//!
//! A [`Context`] is handed to every callback invocation. It tells the callback
//! what happened (kind of event, payload, port, timer) and to whom (the event
//! source and its data), and it offers the operations a callback may perform
//! on its own dispatcher: installing a new callback and operating timers.
//! The context lives on the stack of the dispatcher and ends with the call.

use alloc::boxed::Box;
use ede_core::{EventKind, TimeStamp};

use crate::timer::{TimerContext, TimerHandle, TimerKind, TimerList};

/// Callback of an event source or a timer
pub type Callback<S> = Box<dyn FnMut(&mut Context<'_, S>) + Send>;

/// Index of an event source within its dispatcher
///
/// External sources are fed through the dispatcher's ports, internal ones
/// only by the dispatcher itself (initialization, timers). The two kinds are
/// numbered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSourceIndex {
    External(usize),
    Internal(usize),
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventSourceIndex {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::External(idx) => defmt::write!(fmt, "External({})", idx),
            Self::Internal(idx) => defmt::write!(fmt, "Internal({})", idx),
        }
    }
}

pub(crate) enum EventData<'a> {
    Received(&'a [u8]),
    Timer(TimerContext),
}

/// What triggered a callback invocation
pub(crate) struct Trigger<'a> {
    pub kind: EventKind,
    pub data: EventData<'a>,
    pub idx_port: Option<usize>,
    pub source: EventSourceIndex,
    pub timer: Option<TimerHandle>,
}

/// The dispatcher state a callback may operate on
pub(crate) struct Scope<'a, S> {
    pub timers: &'a mut TimerList<S>,
    pub now: TimeStamp,
    pub queue_full: &'a mut u32,
}

/// View of the dispatcher handed to a callback
pub struct Context<'a, S> {
    trigger: Trigger<'a>,
    source_data: &'a mut S,
    scope: Scope<'a, S>,
    new_callback: Option<Callback<S>>,
}

impl<'a, S> Context<'a, S> {
    pub(crate) fn new(trigger: Trigger<'a>, source_data: &'a mut S, scope: Scope<'a, S>) -> Self {
        Self {
            trigger,
            source_data,
            scope,
            new_callback: None,
        }
    }

    pub(crate) fn into_new_callback(self) -> Option<Callback<S>> {
        self.new_callback
    }

    /// Kind of the event being processed
    ///
    /// [`EventKind::TIMER_ELAPSED`] in timer callbacks and one of the two
    /// initialization kinds during registration.
    pub fn kind(&self) -> EventKind {
        self.trigger.kind
    }

    /// Payload of the event
    ///
    /// For timer events this is the timer's context data; empty for the
    /// initialization events.
    pub fn event_data(&self) -> &[u8] {
        match &self.trigger.data {
            EventData::Received(data) => *data,
            EventData::Timer(context) => context.as_slice(),
        }
    }

    /// Port the event was received through; `None` for synthesized events
    pub fn idx_port(&self) -> Option<usize> {
        self.trigger.idx_port
    }

    /// Dispatcher time of the current pass
    pub fn now(&self) -> TimeStamp {
        self.scope.now
    }

    /// The event source this callback works for
    ///
    /// In a timer callback this is the source in whose context the timer
    /// was created.
    pub fn idx_event_source(&self) -> EventSourceIndex {
        self.trigger.source
    }

    pub fn idx_external_event_source(&self) -> Option<usize> {
        match self.trigger.source {
            EventSourceIndex::External(idx) => Some(idx),
            EventSourceIndex::Internal(_) => None,
        }
    }

    pub fn idx_internal_event_source(&self) -> Option<usize> {
        match self.trigger.source {
            EventSourceIndex::Internal(idx) => Some(idx),
            EventSourceIndex::External(_) => None,
        }
    }

    /// Data registered with the event source
    pub fn source_data(&self) -> &S {
        &*self.source_data
    }

    pub fn source_data_mut(&mut self) -> &mut S {
        &mut *self.source_data
    }

    /// The elapsed timer, if this is a timer callback
    pub fn handle_timer(&self) -> Option<TimerHandle> {
        self.trigger.timer
    }

    /// Context data of the elapsed timer, if this is a timer callback
    pub fn timer_context_data(&self) -> Option<&[u8]> {
        match &self.trigger.data {
            EventData::Timer(context) => Some(context.as_slice()),
            EventData::Received(_) => None,
        }
    }

    /// Replace the callback that is running
    ///
    /// In a timer callback the timer's callback is replaced, otherwise the
    /// one of the external event source. The new callback takes effect when
    /// the current one returns. Has no effect during the initialization of an
    /// internal source, which has no callback of its own.
    pub fn install_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Context<'_, S>) + Send + 'static,
    {
        self.new_callback = Some(Box::new(callback));
    }

    /// Create a timer firing every `period` time units, first at now + `period`
    ///
    /// A period shorter than the tick is raised to the tick. Returns `None`
    /// for a zero period, context data that doesn't fit or if all timers are
    /// in use.
    pub fn create_periodic_timer<F>(
        &mut self,
        period: u32,
        callback: F,
        context_data: &[u8],
    ) -> Option<TimerHandle>
    where
        F: FnMut(&mut Context<'_, S>) + Send + 'static,
    {
        self.create_periodic_timer_shifted(period, period, callback, context_data)
    }

    /// Create a periodic timer first firing at now + `phase`
    ///
    /// Lets several timers of the same period share the load of different
    /// ticks.
    pub fn create_periodic_timer_shifted<F>(
        &mut self,
        period: u32,
        phase: u32,
        callback: F,
        context_data: &[u8],
    ) -> Option<TimerHandle>
    where
        F: FnMut(&mut Context<'_, S>) + Send + 'static,
    {
        self.create_timer(
            TimerKind::Periodic { period, phase },
            Box::new(callback),
            context_data,
        )
    }

    /// Create a timer firing once, `delay` time units from now
    ///
    /// With `kill_at_due_time` the timer disappears after firing. Otherwise
    /// it stays suspended and can be retriggered; a zero delay creates it
    /// suspended right away.
    pub fn create_single_shot_timer<F>(
        &mut self,
        delay: u32,
        callback: F,
        context_data: &[u8],
        kill_at_due_time: bool,
    ) -> Option<TimerHandle>
    where
        F: FnMut(&mut Context<'_, S>) + Send + 'static,
    {
        self.create_timer(
            TimerKind::SingleShot {
                delay,
                kill_at_due_time,
            },
            Box::new(callback),
            context_data,
        )
    }

    fn create_timer(
        &mut self,
        kind: TimerKind,
        callback: Callback<S>,
        context_data: &[u8],
    ) -> Option<TimerHandle> {
        self.scope.timers.create(
            self.scope.now,
            kind,
            self.trigger.source,
            callback,
            context_data,
        )
    }

    fn timer_or_current(&self, timer: Option<TimerHandle>) -> Option<TimerHandle> {
        timer.or(self.trigger.timer)
    }

    /// Kill a timer; `None` means the elapsed timer of this callback
    pub fn kill_timer(&mut self, timer: Option<TimerHandle>) -> bool {
        match self.timer_or_current(timer) {
            Some(handle) => self.scope.timers.kill(handle),
            None => false,
        }
    }

    /// Stop a single-shot timer without releasing it
    ///
    /// A single-shot timer with auto-kill is killed. Periodic timers can't be
    /// suspended.
    pub fn suspend_single_shot_timer(&mut self, timer: Option<TimerHandle>) -> bool {
        match self.timer_or_current(timer) {
            Some(handle) => self.scope.timers.suspend(handle),
            None => false,
        }
    }

    /// Let a single-shot timer elapse `delay` time units from now
    ///
    /// Works for running and suspended timers alike.
    pub fn retrigger_single_shot_timer(&mut self, timer: Option<TimerHandle>, delay: u32) -> bool {
        match self.timer_or_current(timer) {
            Some(handle) => self.scope.timers.retrigger(handle, self.scope.now, delay),
            None => false,
        }
    }

    /// True while the timer exists, suspended or not
    pub fn is_timer_alive(&self, timer: TimerHandle) -> bool {
        self.scope.timers.is_live(timer)
    }

    /// Events lost because the ports of this dispatcher were full
    ///
    /// Counted up to the start of the current pass; saturates.
    pub fn no_queue_full_events(&mut self, reset: bool) -> u32 {
        let count = *self.scope.queue_full;
        if reset {
            *self.scope.queue_full = 0;
        }
        count
    }
}
