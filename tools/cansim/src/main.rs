//! Drives a CAN interface from a simulated bus.
//!
//! A bus thread plays the CAN interrupts: it posts the receptions of the
//! inbound frames and acknowledges the transmissions requested by the
//! outbound frames. The main thread runs the dispatcher tick by tick, in
//! lockstep with the bus thread so that runs are reproducible.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;

use anyhow::Context as _;
use clap::Parser;
use ede_cde::{
    kind, CanConfig, CanContext, CanContextExt, CanEventPoster, CanInterface, OsHandleFrame,
    OsHandleTable,
};
use ede_core::EdeError;
use ede_dispatch::TimerHandle;
use ede_mem::HeapPool;
use thiserror::Error;

const IDX_BUS: usize = 0;
const IDX_DISPATCHER: usize = 0;
const FIRST_RX_HANDLE: OsHandleFrame = 0x10;
const FIRST_TX_HANDLE: OsHandleFrame = 0x40;
const FIRST_RX_CAN_ID: u32 = 0x100;
const FIRST_TX_CAN_ID: u32 = 0x300;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated CAN bus driving an EDE dispatcher")]
struct Opts {
    /// Number of dispatcher passes to run
    #[arg(long, default_value_t = 100)]
    ticks: u32,

    /// Time between two passes in milliseconds
    #[arg(long = "tick", default_value_t = 10, value_name = "MS")]
    tick_period: u32,

    #[arg(long = "rx-frames", default_value_t = 4)]
    rx_frames: usize,

    #[arg(long = "tx-frames", default_value_t = 2)]
    tx_frames: usize,

    /// Every inbound frame is received once in this many ticks
    #[arg(long = "rx-every", default_value_t = 3, value_name = "TICKS")]
    rx_every: u32,

    /// Reception timeout of the inbound frames
    #[arg(long = "rx-timeout", default_value_t = 100, value_name = "MS")]
    rx_timeout: u32,

    /// Send period of the outbound frames
    #[arg(long = "tx-period", default_value_t = 50, value_name = "MS")]
    tx_period: u32,

    /// The first inbound frame falls silent after this tick
    #[arg(long = "silent-after", value_name = "TICK")]
    silent_after: Option<u32>,

    /// Report an error frame on the bus once in this many ticks
    #[arg(long = "error-every", value_name = "TICKS")]
    error_every: Option<u32>,

    #[arg(long = "queue-len", default_value_t = 16)]
    queue_len: usize,

    #[arg(long = "log-level", default_value = "info")]
    log_level: log::LevelFilter,
}

#[derive(Debug, Error)]
enum SimError {
    #[error("CAN interface setup failed: {0}")]
    Setup(#[from] EdeError),
    #[error("invalid option: {0}")]
    Option(&'static str),
    #[error("simulated bus stopped responding")]
    BusLost,
}

/// Counters of the application callbacks
#[derive(Debug, Default)]
struct AppCounters {
    receptions: AtomicU32,
    timeouts: AtomicU32,
    transmissions: AtomicU32,
    acknowledges: AtomicU32,
    bus_errors: AtomicU32,
}

impl AppCounters {
    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum BusCommand {
    Tick(u32),
    Transmit(OsHandleFrame),
    Stop,
}

#[derive(Debug, Default)]
struct BusReport {
    posted: u32,
    rejected: u32,
    blocked: u32,
}

struct BusPlan {
    rx_handles: Vec<OsHandleFrame>,
    rx_every: u32,
    silent_after: Option<u32>,
    error_every: Option<u32>,
}

impl BusPlan {
    fn is_received(&self, idx: usize, tick: u32) -> bool {
        if idx == 0 && self.silent_after.is_some_and(|last| tick > last) {
            return false;
        }
        tick % self.rx_every == idx as u32 % self.rx_every
    }

    fn is_error(&self, tick: u32) -> bool {
        self.error_every.is_some_and(|every| tick % every == every - 1)
    }
}

struct Bus {
    poster: CanEventPoster,
    plan: BusPlan,
    report: BusReport,
}

impl Bus {
    fn post(&mut self, accepted: bool) {
        if accepted {
            self.report.posted += 1;
        } else {
            self.report.rejected += 1;
        }
    }

    fn on_tick(&mut self, tick: u32) {
        for idx in 0..self.plan.rx_handles.len() {
            if self.plan.is_received(idx, tick) {
                let handle = self.plan.rx_handles[idx];
                let accepted = self.poster.post_frame_event(
                    IDX_BUS,
                    handle,
                    kind::FRAME_RECEPTION,
                    &tick.to_le_bytes(),
                );
                self.post(accepted);
            }
        }
        if self.plan.is_error(tick) {
            let accepted = self
                .poster
                .post_bus_event(IDX_BUS, kind::FRAME_ERROR, &[0x01]);
            self.post(accepted);
        }
    }

    fn run(mut self, commands: Receiver<BusCommand>, done: SyncSender<()>) -> BusReport {
        while let Ok(command) = commands.recv() {
            match command {
                BusCommand::Tick(tick) => {
                    self.on_tick(tick);
                    if done.send(()).is_err() {
                        break;
                    }
                }
                BusCommand::Transmit(handle) => {
                    let accepted =
                        self.poster
                            .post_frame_event(IDX_BUS, handle, kind::SEND_ACKNOWLEDGE, &[]);
                    self.post(accepted);
                }
                BusCommand::Stop => break,
            }
        }
        self.report.blocked = self.poster.no_blocked_events(IDX_DISPATCHER);
        self.report
    }
}

fn bus_callback(counters: Arc<AppCounters>) -> impl FnMut(&mut CanContext<'_>) + Send + 'static {
    move |ctx: &mut CanContext<'_>| match ctx.can_kind() {
        kind::BUS_INIT => log::info!("bus {} up", ctx.idx_bus()),
        kind::FRAME_ERROR => {
            AppCounters::bump(&counters.bus_errors);
            log::warn!("{}: error frame on bus {}", ctx.now(), ctx.idx_bus());
        }
        other => log::debug!("bus {}: unexpected event {}", ctx.idx_bus(), other),
    }
}

/// Inbound frames supervise their reception with a single-shot timer
fn rx_callback(
    counters: Arc<AppCounters>,
    timeout: u32,
) -> impl FnMut(&mut CanContext<'_>) + Send + 'static {
    let mut supervision: Option<TimerHandle> = None;
    move |ctx: &mut CanContext<'_>| match ctx.can_kind() {
        kind::FRAME_INIT => {
            let counters = counters.clone();
            supervision = ctx.create_single_shot_timer(
                timeout,
                move |ctx: &mut CanContext<'_>| {
                    AppCounters::bump(&counters.timeouts);
                    log::warn!(
                        "{}: frame {:#x} timed out",
                        ctx.now(),
                        ctx.can_id().unwrap_or_default()
                    );
                },
                &[],
                false,
            );
            if supervision.is_none() {
                log::error!("no timer left to supervise frame {:?}", ctx.can_id());
            }
        }
        kind::FRAME_RECEPTION => {
            AppCounters::bump(&counters.receptions);
            log::trace!("{}: frame {:?} received", ctx.now(), ctx.can_id());
            if let Some(timer) = supervision {
                ctx.retrigger_single_shot_timer(Some(timer), timeout);
            }
        }
        other => log::debug!("frame {:?}: unexpected event {}", ctx.can_id(), other),
    }
}

/// Outbound frames are sent by a periodic timer; the bus acknowledges them
fn tx_callback(
    counters: Arc<AppCounters>,
    period: u32,
    bus: Sender<BusCommand>,
) -> impl FnMut(&mut CanContext<'_>) + Send + 'static {
    move |ctx: &mut CanContext<'_>| match ctx.can_kind() {
        kind::FRAME_INIT => {
            let counters = counters.clone();
            let bus = bus.clone();
            let timer = ctx.create_periodic_timer(
                period,
                move |ctx: &mut CanContext<'_>| {
                    let Some(handle) = ctx.os_handle_frame() else {
                        return;
                    };
                    if bus.send(BusCommand::Transmit(handle)).is_ok() {
                        AppCounters::bump(&counters.transmissions);
                    }
                },
                &[],
            );
            if timer.is_none() {
                log::error!("no timer left to send frame {:?}", ctx.can_id());
            }
        }
        kind::SEND_ACKNOWLEDGE => {
            AppCounters::bump(&counters.acknowledges);
            log::trace!("{}: frame {:?} sent", ctx.now(), ctx.can_id());
        }
        other => log::debug!("frame {:?}: unexpected event {}", ctx.can_id(), other),
    }
}

fn validate(opts: &Opts) -> Result<(), SimError> {
    if opts.rx_frames + opts.tx_frames == 0 {
        return Err(SimError::Option("at least one frame is required"));
    }
    if opts.rx_every == 0 {
        return Err(SimError::Option("--rx-every must not be zero"));
    }
    if opts.error_every == Some(0) {
        return Err(SimError::Option("--error-every must not be zero"));
    }
    if opts.tick_period == 0 {
        return Err(SimError::Option("--tick must not be zero"));
    }
    Ok(())
}

struct Summary {
    counters: Arc<AppCounters>,
    bus: BusReport,
    queue_full: u32,
    unmapped: u32,
    resyncs: u32,
}

fn simulate(opts: &Opts) -> Result<Summary, SimError> {
    validate(opts)?;
    let pool = HeapPool::new();
    let no_frames = opts.rx_frames + opts.tx_frames;
    let config = CanConfig::builder()
        .max_frames(no_frames)
        .max_timers(no_frames)
        .queue_len(opts.queue_len)
        .build();

    let mut can = CanInterface::new(config, &pool)?;
    can.install_map_os_handle_frame_to_index(OsHandleTable::new(no_frames, &pool)?)?;
    can.create_dispatcher(IDX_DISPATCHER, opts.tick_period)?;

    let counters = Arc::new(AppCounters::default());
    let (bus_tx, bus_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::sync_channel(0);

    can.register_bus(IDX_BUS, IDX_DISPATCHER, bus_callback(counters.clone()))?;
    let mut rx_handles = Vec::with_capacity(opts.rx_frames);
    for i in 0..opts.rx_frames {
        let handle = FIRST_RX_HANDLE + i as OsHandleFrame;
        can.register_frame(
            FIRST_RX_CAN_ID + i as u32,
            true,
            IDX_BUS,
            handle,
            IDX_DISPATCHER,
            rx_callback(counters.clone(), opts.rx_timeout),
        )?;
        rx_handles.push(handle);
    }
    for i in 0..opts.tx_frames {
        can.register_frame(
            FIRST_TX_CAN_ID + i as u32,
            false,
            IDX_BUS,
            FIRST_TX_HANDLE + i as OsHandleFrame,
            IDX_DISPATCHER,
            tx_callback(counters.clone(), opts.tx_period, bus_tx.clone()),
        )?;
    }
    log::info!("{} frames registered", can.no_frames());

    let (poster, mut system) = can.into_parts()?;
    let bus = Bus {
        poster,
        plan: BusPlan {
            rx_handles,
            rx_every: opts.rx_every,
            silent_after: opts.silent_after,
            error_every: opts.error_every,
        },
        report: BusReport::default(),
    };
    let bus_thread = thread::spawn(move || bus.run(bus_rx, done_tx));

    let mut queue_full = 0;
    for tick in 0..opts.ticks {
        if bus_tx.send(BusCommand::Tick(tick)).is_err() || done_rx.recv().is_err() {
            return Err(SimError::BusLost);
        }
        system.dispatcher_main(IDX_DISPATCHER)?;
        queue_full = system.no_queue_full_events(IDX_DISPATCHER, false);
    }
    // The frame callbacks keep clones of the command channel alive
    let _ = bus_tx.send(BusCommand::Stop);
    let bus = bus_thread.join().map_err(|_| SimError::BusLost)?;

    let dispatcher = system.dispatcher_mut(IDX_DISPATCHER)?;
    Ok(Summary {
        counters,
        bus,
        queue_full,
        unmapped: dispatcher.no_unmapped_events(),
        resyncs: dispatcher.no_port_resyncs(),
    })
}

fn print_summary(summary: &Summary) {
    let counters = &summary.counters;
    let load = |counter: &AtomicU32| counter.load(Ordering::Relaxed);
    println!("events posted      {}", summary.bus.posted);
    println!("events rejected    {}", summary.bus.rejected);
    println!("events blocked     {}", summary.bus.blocked);
    println!("queue full events  {}", summary.queue_full);
    println!("unmapped events    {}", summary.unmapped);
    println!("port resyncs       {}", summary.resyncs);
    println!("receptions         {}", load(&counters.receptions));
    println!("reception timeouts {}", load(&counters.timeouts));
    println!("transmissions      {}", load(&counters.transmissions));
    println!("acknowledges       {}", load(&counters.acknowledges));
    println!("bus errors         {}", load(&counters.bus_errors));
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    env_logger::Builder::new()
        .filter_level(opts.log_level)
        .format_timestamp(None)
        .init();

    let summary = simulate(&opts).context("simulation aborted")?;
    print_summary(&summary);
    Ok(())
}
