use std::boxed::Box;
use std::vec::Vec;

use ede_core::TimeStamp;
use ede_mem::HeapPool;

use crate::context::{Callback, Context, EventSourceIndex};
use crate::timer::{TimerKind, TimerList};

const ROOT: EventSourceIndex = EventSourceIndex::Internal(0);

fn noop() -> Callback<()> {
    Box::new(|_ctx: &mut Context<'_, ()>| {})
}

fn at(raw: u32) -> TimeStamp {
    TimeStamp::new(raw)
}

fn single_shot(delay: u32, kill_at_due_time: bool) -> TimerKind {
    TimerKind::SingleShot {
        delay,
        kill_at_due_time,
    }
}

fn periodic(period: u32) -> TimerKind {
    TimerKind::Periodic {
        period,
        phase: period,
    }
}

fn due_now(list: &TimerList<()>) -> Vec<usize> {
    (0..).map_while(|n| list.due_entry(n)).collect()
}

/// Fire everything due at `now` the way a dispatcher pass does
fn fire_all(list: &mut TimerList<()>, now: TimeStamp) -> Vec<usize> {
    list.collect_due(now);
    let due = due_now(list);
    for &index in &due {
        if let Some(firing) = list.begin_fire(index, now) {
            list.end_fire(index, now, firing.callback);
        }
    }
    list.settle();
    due
}

#[test]
fn periodic_timer_reloads() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();
    let handle = list.create(at(0), periodic(5), ROOT, noop(), &[]).unwrap();

    for now in 0..5 {
        assert!(fire_all(&mut list, at(now)).is_empty());
    }
    assert_eq!(fire_all(&mut list, at(5)), [handle.index()]);
    for now in 6..10 {
        assert!(fire_all(&mut list, at(now)).is_empty());
    }
    assert_eq!(fire_all(&mut list, at(10)), [handle.index()]);
    assert!(list.is_live(handle));
}

#[test]
fn period_below_tick_is_raised() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 10, &pool).unwrap();
    let handle = list.create(at(0), periodic(3), ROOT, noop(), &[]).unwrap();
    list.settle();

    assert_eq!(fire_all(&mut list, at(10)), [handle.index()]);
    // Next due at 3 + 10
    assert!(fire_all(&mut list, at(12)).is_empty());
    assert_eq!(fire_all(&mut list, at(20)), [handle.index()]);
}

#[test]
fn invalid_timer_arguments_are_rejected() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();

    assert!(list.create(at(0), periodic(0), ROOT, noop(), &[]).is_none());
    assert!(list.create(at(0), single_shot(0, true), ROOT, noop(), &[]).is_none());
    assert!(list.create(at(0), single_shot(1, false), ROOT, noop(), &[0; 17]).is_none());
    assert_eq!(list.no_live(), 0);

    let handle = list.create(at(0), periodic(2), ROOT, noop(), &[]).unwrap();
    assert!(!list.suspend(handle));
    assert!(!list.retrigger(handle, at(0), 5));
}

#[test]
fn zero_delay_creates_suspended_timer() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();
    let handle = list
        .create(at(0), single_shot(0, false), ROOT, noop(), &[])
        .unwrap();

    assert!(list.is_live(handle));
    for now in 0..10 {
        assert!(fire_all(&mut list, at(now)).is_empty());
    }
    assert!(!list.retrigger(handle, at(10), 0));
    assert!(list.retrigger(handle, at(10), 3));
    assert!(fire_all(&mut list, at(12)).is_empty());
    assert_eq!(fire_all(&mut list, at(13)), [handle.index()]);
}

#[test]
fn single_shot_is_suspended_after_firing() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();
    let handle = list
        .create(at(0), single_shot(3, false), ROOT, noop(), &[])
        .unwrap();
    list.settle();

    assert_eq!(fire_all(&mut list, at(3)), [handle.index()]);
    assert!(list.is_live(handle));
    assert!(fire_all(&mut list, at(4)).is_empty());

    assert!(list.retrigger(handle, at(4), 2));
    assert_eq!(fire_all(&mut list, at(6)), [handle.index()]);
}

#[test]
fn auto_kill_timer_disappears_after_firing() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(1, 1, &pool).unwrap();
    let handle = list
        .create(at(0), single_shot(2, true), ROOT, noop(), &[])
        .unwrap();
    list.settle();

    assert_eq!(fire_all(&mut list, at(2)), [handle.index()]);
    assert!(!list.is_live(handle));
    assert_eq!(list.no_live(), 0);

    // The slot comes back after the next scan, under a new generation.
    fire_all(&mut list, at(3));
    let reused = list
        .create(at(3), single_shot(2, true), ROOT, noop(), &[])
        .unwrap();
    assert_eq!(reused.index(), handle.index());
    assert_ne!(reused, handle);
    assert!(!list.kill(handle));
}

#[test]
fn killed_slot_is_reclaimed_at_next_scan() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(1, 1, &pool).unwrap();
    let handle = list.create(at(0), periodic(1), ROOT, noop(), &[]).unwrap();

    assert!(list.kill(handle));
    assert!(!list.is_live(handle));
    assert!(list.create(at(0), periodic(1), ROOT, noop(), &[]).is_none());

    list.collect_due(at(0));
    assert!(list.create(at(0), periodic(1), ROOT, noop(), &[]).is_some());
}

#[test]
fn suspending_auto_kill_timer_kills_it() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(2, 1, &pool).unwrap();
    let plain = list
        .create(at(0), single_shot(5, false), ROOT, noop(), &[])
        .unwrap();
    let auto_kill = list
        .create(at(0), single_shot(5, true), ROOT, noop(), &[])
        .unwrap();

    assert!(list.suspend(plain));
    assert!(list.suspend(auto_kill));
    assert!(list.is_live(plain));
    assert!(!list.is_live(auto_kill));
    list.settle();
    assert!(fire_all(&mut list, at(5)).is_empty());
}

#[test]
fn new_timers_wait_for_next_scan() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(2, 1, &pool).unwrap();
    let handle = list
        .create(
            at(0),
            TimerKind::Periodic {
                period: 4,
                phase: 0,
            },
            ROOT,
            noop(),
            &[],
        )
        .unwrap();

    list.collect_due(at(0));
    assert!(due_now(&list).is_empty());
    list.settle();
    list.collect_due(at(0));
    assert_eq!(due_now(&list), [handle.index()]);
}

#[test]
fn most_overdue_fires_first_then_creation_order() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 10, &pool).unwrap();
    let late = list
        .create(at(0), single_shot(7, false), ROOT, noop(), &[])
        .unwrap();
    let early = list
        .create(at(0), single_shot(3, false), ROOT, noop(), &[])
        .unwrap();
    let tie_first = list
        .create(at(0), single_shot(5, false), ROOT, noop(), &[])
        .unwrap();
    let tie_second = list
        .create(at(0), single_shot(5, true), ROOT, noop(), &[])
        .unwrap();
    list.settle();

    assert_eq!(
        fire_all(&mut list, at(10)),
        [
            early.index(),
            tie_first.index(),
            tie_second.index(),
            late.index()
        ]
    );
}

#[test]
fn firing_carries_context_data() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(1, 1, &pool).unwrap();
    let handle = list
        .create(at(0), single_shot(1, true), EventSourceIndex::External(3), noop(), b"ctx")
        .unwrap();
    list.settle();

    list.collect_due(at(1));
    let firing = list.begin_fire(handle.index(), at(1)).unwrap();
    assert_eq!(firing.handle, handle);
    assert_eq!(firing.root, EventSourceIndex::External(3));
    assert_eq!(firing.context.as_slice(), b"ctx");
}

#[test]
fn timers_fire_across_tick_rollover() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();
    let start = u32::MAX - 2;
    let fast = list.create(at(start), periodic(2), ROOT, noop(), &[]).unwrap();
    let slow = list.create(at(start), periodic(4), ROOT, noop(), &[]).unwrap();
    let once = list
        .create(at(start), single_shot(3, true), ROOT, noop(), &[])
        .unwrap();
    list.settle();

    assert!(fire_all(&mut list, at(start + 1)).is_empty());
    assert_eq!(fire_all(&mut list, at(u32::MAX)), [fast.index()]);
    assert_eq!(fire_all(&mut list, at(0)), [once.index()]);
    assert!(!list.is_live(once));
    assert_eq!(fire_all(&mut list, at(1)), [fast.index(), slow.index()]);
    assert!(fire_all(&mut list, at(2)).is_empty());
    assert_eq!(fire_all(&mut list, at(3)), [fast.index()]);
    assert_eq!(fire_all(&mut list, at(5)), [fast.index(), slow.index()]);
}

#[test]
fn overdue_order_holds_across_tick_rollover() {
    let pool = HeapPool::new();
    let mut list = TimerList::new(4, 1, &pool).unwrap();
    let start = u32::MAX - 2;
    let late = list
        .create(at(start), single_shot(4, false), ROOT, noop(), &[])
        .unwrap();
    let early = list
        .create(at(start), single_shot(2, false), ROOT, noop(), &[])
        .unwrap();
    list.settle();

    // Due at u32::MAX and at 1: the older due time wins over creation order
    assert_eq!(fire_all(&mut list, at(1)), [early.index(), late.index()]);
    assert!(fire_all(&mut list, at(2)).is_empty());
    assert!(list.is_live(early) && list.is_live(late));

    assert!(list.retrigger(late, at(2), 3));
    assert!(fire_all(&mut list, at(4)).is_empty());
    assert_eq!(fire_all(&mut list, at(5)), [late.index()]);
}
