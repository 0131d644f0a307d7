//! Timer objects of a dispatcher
//!
//! Every dispatcher owns a fixed number of timer slots. A killed timer keeps
//! its slot until the next scan, so that callbacks never observe a timer
//! disappearing in the middle of a pass; afterwards the slot is free for
//! reuse and its generation is bumped to invalidate stale handles.

use ede_core::{EdeResult, TimeStamp};
use ede_mem::{alloc_table, alloc_table_with, MemoryPool, Table};

use crate::context::{Callback, EventSourceIndex};

/// Capacity of the context data a timer carries to its callback
pub const TIMER_CONTEXT_SIZE: usize = 16;

/// Inline context data of a timer
pub type TimerContext = heapless::Vec<u8, TIMER_CONTEXT_SIZE>;

/// Handle of a timer, unique within its dispatcher while the timer lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: u16,
    generation: u16,
}

impl TimerHandle {
    /// Slot of the timer in its dispatcher
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerHandle {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Timer({}/{})", self.index, self.generation);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerState {
    Free,
    Periodic { reload: u32 },
    SingleShot,
    SingleShotAutoKill,
    Suspended,
    Killed,
}

impl TimerState {
    fn is_running(self) -> bool {
        matches!(
            self,
            TimerState::Periodic { .. } | TimerState::SingleShot | TimerState::SingleShotAutoKill
        )
    }

    fn is_live(self) -> bool {
        !matches!(self, TimerState::Free | TimerState::Killed)
    }
}

/// What kind of timer to create
#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerKind {
    Periodic { period: u32, phase: u32 },
    SingleShot { delay: u32, kill_at_due_time: bool },
}

struct TimerSlot<S> {
    generation: u16,
    state: TimerState,
    due: TimeStamp,
    root: EventSourceIndex,
    callback: Option<Callback<S>>,
    context: TimerContext,
    /// Creation order; breaks ties between timers due at the same time
    seq: u32,
    /// Created during the current pass, not yet considered for firing
    fresh: bool,
}

impl<S> TimerSlot<S> {
    fn free() -> Self {
        Self {
            generation: 0,
            state: TimerState::Free,
            due: TimeStamp::ZERO,
            root: EventSourceIndex::Internal(0),
            callback: None,
            context: TimerContext::new(),
            seq: 0,
            fresh: false,
        }
    }
}

/// A due timer taken out for its callback
pub(crate) struct Firing<S> {
    pub handle: TimerHandle,
    pub root: EventSourceIndex,
    pub callback: Callback<S>,
    pub context: TimerContext,
}

/// Entry of the list of due timers: `(overdue by, seq, slot)`
type DueEntry = (i32, u32, u16);

pub(crate) struct TimerList<S> {
    slots: Table<TimerSlot<S>>,
    due: Table<DueEntry>,
    tick: u32,
    next_seq: u32,
}

impl<S> TimerList<S> {
    pub fn new(capacity: usize, tick: u32, pool: &dyn MemoryPool) -> EdeResult<Self> {
        let capacity = capacity.min(u16::MAX as usize);
        Ok(Self {
            slots: alloc_table_with(pool, capacity, |_| TimerSlot::free())?,
            due: alloc_table(pool, capacity)?,
            tick,
            next_seq: 0,
        })
    }

    pub fn create(
        &mut self,
        now: TimeStamp,
        kind: TimerKind,
        root: EventSourceIndex,
        callback: Callback<S>,
        context: &[u8],
    ) -> Option<TimerHandle> {
        let Ok(context) = TimerContext::from_slice(context) else {
            log::warn!("timer context data exceeds {} bytes", TIMER_CONTEXT_SIZE);
            return None;
        };
        let (state, due) = match kind {
            TimerKind::Periodic { period: 0, .. } => return None,
            TimerKind::Periodic { period, phase } => (
                TimerState::Periodic {
                    reload: period.max(self.tick),
                },
                now.wrapping_add(phase),
            ),
            TimerKind::SingleShot {
                delay: 0,
                kill_at_due_time: true,
            } => return None,
            TimerKind::SingleShot {
                delay: 0,
                kill_at_due_time: false,
            } => (TimerState::Suspended, now),
            TimerKind::SingleShot {
                delay,
                kill_at_due_time,
            } => (
                if kill_at_due_time {
                    TimerState::SingleShotAutoKill
                } else {
                    TimerState::SingleShot
                },
                now.wrapping_add(delay),
            ),
        };
        if due.diff(now) < 0 {
            return None;
        }

        let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.state == TimerState::Free)
        else {
            log::warn!("no free timer, capacity is {}", self.slots.len());
            return None;
        };
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let slot = &mut self.slots[index];
        slot.state = state;
        slot.due = due;
        slot.root = root;
        slot.callback = Some(callback);
        slot.context = context;
        slot.seq = seq;
        slot.fresh = true;
        log::debug!("timer {} created, {:?}, due at {}", index, state, due);
        Some(TimerHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    fn live_slot(&mut self, handle: TimerHandle) -> Option<&mut TimerSlot<S>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.state.is_live())
    }

    pub fn kill(&mut self, handle: TimerHandle) -> bool {
        match self.live_slot(handle) {
            Some(slot) => {
                slot.state = TimerState::Killed;
                true
            }
            None => false,
        }
    }

    /// Suspend a single-shot timer; an auto-kill timer is killed instead
    pub fn suspend(&mut self, handle: TimerHandle) -> bool {
        let Some(slot) = self.live_slot(handle) else {
            return false;
        };
        match slot.state {
            TimerState::SingleShot | TimerState::Suspended => {
                slot.state = TimerState::Suspended;
                true
            }
            TimerState::SingleShotAutoKill => {
                slot.state = TimerState::Killed;
                true
            }
            _ => false,
        }
    }

    /// Make a single-shot timer due `delay` after `now`
    pub fn retrigger(&mut self, handle: TimerHandle, now: TimeStamp, delay: u32) -> bool {
        if delay == 0 || delay > TimeStamp::MAX_SPAN {
            return false;
        }
        let Some(slot) = self.live_slot(handle) else {
            return false;
        };
        match slot.state {
            TimerState::SingleShot | TimerState::SingleShotAutoKill => {}
            TimerState::Suspended => slot.state = TimerState::SingleShot,
            _ => return false,
        }
        slot.due = now.wrapping_add(delay);
        true
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.slots.get(handle.index as usize).is_some_and(|slot| {
            slot.generation == handle.generation && slot.state.is_live()
        })
    }

    /// Number of timers that exist, suspended ones included
    pub fn no_live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.is_live()).count()
    }

    /// Reclaim killed timers and list the due ones in firing order
    ///
    /// The most overdue timer fires first; among equally due timers the one
    /// created first.
    pub fn collect_due(&mut self, now: TimeStamp) {
        self.due.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == TimerState::Killed {
                slot.state = TimerState::Free;
                slot.callback = None;
                slot.generation = slot.generation.wrapping_add(1);
            } else if slot.state.is_running() && !slot.fresh && slot.due.is_due(now) {
                let _ = self.due.push((now.diff(slot.due), slot.seq, index as u16));
            }
        }
        self.due
            .sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    }

    /// Slot of the `n`-th due timer of the current pass
    pub fn due_entry(&self, n: usize) -> Option<usize> {
        self.due.get(n).map(|&(_, _, index)| index as usize)
    }

    /// Take the callback of a due timer for firing
    ///
    /// Returns `None` if a callback fired earlier in the same pass has killed,
    /// suspended or retriggered the timer meanwhile.
    pub fn begin_fire(&mut self, index: usize, now: TimeStamp) -> Option<Firing<S>> {
        let slot = self.slots.get_mut(index)?;
        if !slot.state.is_running() || !slot.due.is_due(now) {
            return None;
        }
        let callback = slot.callback.take()?;
        Some(Firing {
            handle: TimerHandle {
                index: index as u16,
                generation: slot.generation,
            },
            root: slot.root,
            callback,
            context: slot.context.clone(),
        })
    }

    /// Give the callback back and advance the timer
    pub fn end_fire(&mut self, index: usize, now: TimeStamp, callback: Callback<S>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.callback = Some(callback);
        match slot.state {
            TimerState::Periodic { reload } => slot.due = slot.due.wrapping_add(reload),
            // Still elapsed means it was not retriggered from its own callback.
            TimerState::SingleShot if slot.due.is_due(now) => slot.state = TimerState::Suspended,
            TimerState::SingleShotAutoKill => slot.state = TimerState::Killed,
            _ => {}
        }
    }

    /// End of the scan: timers created meanwhile take part from now on
    pub fn settle(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.fresh = false;
        }
    }
}
