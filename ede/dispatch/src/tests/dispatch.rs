use std::boxed::Box;
use std::vec;
use std::vec::Vec;

use ede_core::{EdeError, EdeResult, EventKind, SenderHandle};
use ede_mem::HeapPool;

use super::{Collector, ScriptedPort};
use crate::{
    DirectLookupMap, DispatcherConfig, DispatcherPort, DispatcherSystem, HandleRange, IdentityMap, SystemConfig,
    TimerHandle,
};

const KIND: EventKind = EventKind::FIRST_CUSTOM;

fn system_with_port<'p, S>(
    pool: &'p HeapPool,
    config: SystemConfig,
    port: &ScriptedPort,
) -> DispatcherSystem<'p, S> {
    let mut system = DispatcherSystem::new(config, pool).unwrap();
    system
        .create_dispatcher(
            0,
            DispatcherConfig::with_tick(1),
            vec![port.boxed()],
            Box::new(IdentityMap),
        )
        .unwrap();
    system
}

fn run<S>(system: &mut DispatcherSystem<'_, S>, passes: usize) {
    for _ in 0..passes {
        system.dispatcher_main(0).unwrap();
    }
}

#[test]
fn events_reach_their_source_after_init() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();

    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| sink.push((ctx.kind(), ctx.event_data().to_vec(), ctx.idx_port())),
            (),
        )
        .unwrap();
    port.push_event(KIND, SenderHandle(0), b"a");
    port.push_event(KIND, SenderHandle(0), b"bc");
    run(&mut system, 1);

    assert_eq!(
        seen.snapshot(),
        [
            (EventKind::EXTERNAL_SOURCE_INIT, vec![], None),
            (KIND, b"a".to_vec(), Some(0)),
            (KIND, b"bc".to_vec(), Some(0)),
        ]
    );
}

#[test]
fn unmapped_and_malformed_records_are_counted() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(0, KIND, SenderHandle(0), move |ctx| sink.push(ctx.kind()), ())
        .unwrap();

    port.push_event(KIND, SenderHandle(7), b"nobody");
    port.push_raw(&[1, 2, 3]);
    port.push_event(KIND, SenderHandle(0), b"");
    run(&mut system, 1);

    assert_eq!(seen.snapshot(), [EventKind::EXTERNAL_SOURCE_INIT, KIND]);
    assert_eq!(system.dispatcher(0).unwrap().no_unmapped_events(), 2);
}

#[test]
fn broken_port_is_resynced() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| sink.push(ctx.event_data().to_vec()),
            (),
        )
        .unwrap();

    port.push_event(KIND, SenderHandle(0), b"lost");
    port.broken.store(true, core::sync::atomic::Ordering::Relaxed);
    run(&mut system, 1);
    assert_eq!(system.dispatcher(0).unwrap().no_port_resyncs(), 1);

    port.push_event(KIND, SenderHandle(0), b"kept");
    run(&mut system, 1);
    assert_eq!(seen.snapshot(), [vec![], b"kept".to_vec()]);
    assert_eq!(system.dispatcher(0).unwrap().no_port_resyncs(), 1);
}

#[test]
fn queue_full_events_are_harvested_from_ports() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| sink.push(ctx.no_queue_full_events(false)),
            (),
        )
        .unwrap();

    port.drops.store(3, core::sync::atomic::Ordering::Relaxed);
    port.push_event(KIND, SenderHandle(0), b"");
    run(&mut system, 1);

    assert_eq!(seen.snapshot(), [0, 3]);
    assert_eq!(system.no_queue_full_events(0, true), 3);
    assert_eq!(system.no_queue_full_events(0, false), 0);
}

#[test]
fn installed_callback_takes_over_after_return() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| {
                sink.push("first");
                let sink = sink.clone();
                ctx.install_callback(move |_ctx| sink.push("second"));
            },
            (),
        )
        .unwrap();

    port.push_event(KIND, SenderHandle(0), b"");
    port.push_event(KIND, SenderHandle(0), b"");
    run(&mut system, 1);

    // The init event already ran the first callback.
    assert_eq!(seen.snapshot(), ["first", "second", "second"]);
}

#[test]
fn timer_callback_can_replace_itself() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_internal_event_source(
            0,
            move |ctx| {
                let timer = ctx.create_periodic_timer(
                    1,
                    move |ctx| {
                        sink.push(1);
                        let sink = sink.clone();
                        ctx.install_callback(move |_ctx| sink.push(2));
                    },
                    &[],
                );
                assert!(timer.is_some());
            },
            (),
        )
        .unwrap();

    run(&mut system, 4);
    assert_eq!(seen.snapshot(), [1, 2, 2]);
}

#[test]
fn timers_work_on_data_of_their_source() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<u32>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_internal_event_source(
            0,
            move |ctx| {
                assert_eq!(ctx.kind(), EventKind::INTERNAL_SOURCE_INIT);
                ctx.create_periodic_timer(
                    2,
                    move |ctx| {
                        sink.push((ctx.kind(), ctx.idx_internal_event_source(), ctx.now().raw()));
                        *ctx.source_data_mut() += 1;
                    },
                    &[],
                );
            },
            0,
        )
        .unwrap();

    run(&mut system, 7);
    let dispatcher = system.dispatcher(0).unwrap();
    assert_eq!(dispatcher.internal_source_data(0), Some(&3));
    assert_eq!(
        seen.snapshot(),
        [
            (EventKind::TIMER_ELAPSED, Some(0), 2),
            (EventKind::TIMER_ELAPSED, Some(0), 4),
            (EventKind::TIMER_ELAPSED, Some(0), 6),
        ]
    );
}

#[test]
fn received_events_retrigger_a_timeout() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<Option<TimerHandle>>(&pool, SystemConfig::default(), &port);
    let timeouts = Collector::default();
    let sink = timeouts.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| {
                if ctx.kind() == EventKind::EXTERNAL_SOURCE_INIT {
                    let sink = sink.clone();
                    let handle = ctx.create_single_shot_timer(
                        3,
                        move |ctx| sink.push(ctx.now().raw()),
                        &[],
                        false,
                    );
                    *ctx.source_data_mut() = handle;
                } else {
                    let timer = *ctx.source_data();
                    assert!(ctx.retrigger_single_shot_timer(timer, 3));
                }
            },
            None,
        )
        .unwrap();

    for _ in 0..3 {
        port.push_event(KIND, SenderHandle(0), b"");
        run(&mut system, 1);
    }
    run(&mut system, 7);

    assert_eq!(timeouts.snapshot(), [5]);
    let dispatcher = system.dispatcher(0).unwrap();
    let handle = dispatcher.external_source_data(0).copied().flatten().unwrap();
    assert!(dispatcher.is_timer_alive(handle));
}

#[test]
fn timer_context_and_kill_from_callback() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| {
                if ctx.kind() != EventKind::EXTERNAL_SOURCE_INIT {
                    return;
                }
                let sink = sink.clone();
                let mut count = 0;
                ctx.create_periodic_timer(
                    1,
                    move |ctx| {
                        count += 1;
                        sink.push((
                            ctx.timer_context_data().map(<[u8]>::to_vec),
                            ctx.idx_external_event_source(),
                        ));
                        if count == 2 {
                            assert!(ctx.kill_timer(None));
                        }
                    },
                    b"ctx",
                );
            },
            (),
        )
        .unwrap();

    run(&mut system, 6);
    assert_eq!(
        seen.snapshot(),
        [(Some(b"ctx".to_vec()), Some(0)), (Some(b"ctx".to_vec()), Some(0))]
    );
    assert_eq!(system.dispatcher(0).unwrap().no_timers(), 0);
}

#[test]
fn failed_registrations_leave_sources_intact() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let config = SystemConfig::builder().max_external_sources(1).build();
    let mut system = system_with_port::<u8>(&pool, config, &port);

    assert_eq!(
        system.register_external_event_source(0, KIND, SenderHandle(0), |_| {}, 1),
        Ok(0)
    );
    assert_eq!(
        system.register_external_event_source(0, EventKind::TIMER_ELAPSED, SenderHandle(1), |_| {}, 2),
        Err(EdeError::InvalidArgument)
    );
    assert_eq!(
        system.register_external_event_source(0, KIND, SenderHandle(1), |_| {}, 3),
        Err(EdeError::CapacityExhausted)
    );

    let dispatcher = system.dispatcher(0).unwrap();
    assert_eq!(dispatcher.no_external_sources(), 1);
    assert_eq!(dispatcher.external_source_key(0), Some((KIND, SenderHandle(0))));
    assert_eq!(dispatcher.external_source_data(0), Some(&1));
}

#[test]
fn map_conflict_rolls_back_registration() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let map = DirectLookupMap::new(&[HandleRange::Unused], &pool).unwrap();
    let mut system = DispatcherSystem::<()>::new(SystemConfig::default(), &pool).unwrap();
    system
        .create_dispatcher(0, DispatcherConfig::default(), vec![port.boxed()], Box::new(map))
        .unwrap();
    let seen = Collector::default();
    let first = seen.clone();
    let second = seen.clone();

    let kind = EventKind::new(0);
    system
        .register_external_event_source(0, kind, SenderHandle(0), move |_| first.push(0), ())
        .unwrap();
    assert_eq!(
        system.register_external_event_source(0, kind, SenderHandle(1), move |_| second.push(1), ()),
        Err(EdeError::MapConflict)
    );
    assert_eq!(system.dispatcher(0).unwrap().no_external_sources(), 1);

    port.push_event(kind, SenderHandle(5), b"");
    run(&mut system, 1);
    assert_eq!(seen.snapshot(), [0, 0]);
}

#[test]
fn identity_map_rejects_handle_of_another_index() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<u32>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();

    let recorder = |handle: u32| {
        let sink = seen.clone();
        move |ctx: &mut crate::Context<'_, u32>| {
            if ctx.kind() == KIND {
                sink.push((handle, ctx.event_data()[0]));
            }
        }
    };
    assert_eq!(
        system.register_external_event_source(0, KIND, SenderHandle(1), recorder(1), 1),
        Err(EdeError::MapConflict)
    );
    assert_eq!(
        system.register_external_event_source(0, KIND, SenderHandle(0), recorder(0), 0),
        Ok(0)
    );
    assert_eq!(
        system.register_external_event_source(0, KIND, SenderHandle(1), recorder(1), 1),
        Ok(1)
    );

    port.push_event(KIND, SenderHandle(0), &[0]);
    port.push_event(KIND, SenderHandle(1), &[1]);
    run(&mut system, 1);
    assert_eq!(seen.snapshot(), [(0, 0), (1, 1)]);
}

#[test]
fn reserved_kinds_from_a_port_are_not_dispatched() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let mut system = system_with_port::<()>(&pool, SystemConfig::default(), &port);
    let seen = Collector::default();
    let sink = seen.clone();
    system
        .register_external_event_source(
            0,
            KIND,
            SenderHandle(0),
            move |ctx| sink.push((ctx.kind(), ctx.handle_timer().is_some())),
            (),
        )
        .unwrap();

    port.push_event(EventKind::EXTERNAL_SOURCE_INIT, SenderHandle(0), b"");
    port.push_event(EventKind::TIMER_ELAPSED, SenderHandle(0), b"");
    port.push_event(EventKind::INTERNAL_SOURCE_INIT, SenderHandle(0), b"");
    port.push_event(KIND, SenderHandle(0), b"");
    run(&mut system, 1);

    assert_eq!(
        seen.snapshot(),
        [(EventKind::EXTERNAL_SOURCE_INIT, false), (KIND, false)]
    );
    assert_eq!(system.dispatcher(0).unwrap().no_unmapped_events(), 3);
}

fn create(
    system: &mut DispatcherSystem<'_, ()>,
    idx: usize,
    tick: u32,
    ports: Vec<Box<dyn DispatcherPort>>,
) -> EdeResult<()> {
    system.create_dispatcher(idx, DispatcherConfig::with_tick(tick), ports, Box::new(IdentityMap))
}

#[test]
fn system_setup_errors() {
    let pool = HeapPool::new();
    let port = ScriptedPort::default();
    let config = SystemConfig::builder().no_dispatchers(2).build();
    let mut system = DispatcherSystem::<()>::new(config, &pool).unwrap();

    assert_eq!(create(&mut system, 2, 1, vec![port.boxed()]), Err(EdeError::InvalidIndex));
    assert_eq!(create(&mut system, 0, 0, vec![port.boxed()]), Err(EdeError::InvalidArgument));
    assert_eq!(create(&mut system, 0, 1, vec![]), Err(EdeError::InvalidArgument));
    assert_eq!(create(&mut system, 0, 1, vec![port.boxed()]), Ok(()));
    assert_eq!(create(&mut system, 0, 1, vec![port.boxed()]), Err(EdeError::AlreadyCreated));

    assert_eq!(system.dispatcher_main(1), Err(EdeError::NotCreated));
    assert!(system.dispatcher(1).is_none());
    assert!(matches!(system.into_dispatchers(), Err(EdeError::NotCreated)));

    assert!(DispatcherSystem::<()>::new(SystemConfig::builder().no_dispatchers(0).build(), &pool).is_err());
}
