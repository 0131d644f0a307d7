#![no_std]
#![forbid(unsafe_code)]

//! # EDE Dispatch
//!
//! The event dispatcher engine. Producers post events through a [`Sender`]
//! into ports; a [`Dispatcher`] drains its ports once per tick and invokes
//! the callback of the event source each event belongs to, then fires its
//! due timers. A [`DispatcherSystem`] sets up several dispatchers from one
//! memory pool.
//!
//! ```ignore
//! let pool = HeapPool::new();
//! let (tail, head) = ede_vsq::create_queue(8, 16, &pool)?;
//! let mut system = DispatcherSystem::new(SystemConfig::default(), &pool)?;
//! system.create_dispatcher(0, DispatcherConfig::with_tick(1), vec![Box::new(head)], Box::new(IdentityMap))?;
//! system.register_external_event_source(0, EventKind::FIRST_CUSTOM, SenderHandle(0), |ctx| {
//!     log::info!("{} bytes", ctx.event_data().len());
//! }, ())?;
//! let mut sender = Sender::new(vec![Box::new(tail)], None, &pool)?;
//! sender.post_event(EventKind::FIRST_CUSTOM, SenderHandle(0), b"hello");
//! system.dispatcher_main(0)?;
//! ```

extern crate alloc;

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod map;
pub mod port;
pub mod sender;
pub mod system;
pub mod timer;

pub use config::{DispatcherConfig, DispatcherConfigBuilder, SystemConfig, SystemConfigBuilder};
pub use context::{Callback, Context, EventSourceIndex};
pub use dispatcher::Dispatcher;
pub use map::{
    CanIdKind, CanIdMap, DirectLookupMap, HandleMap, HandleRange, IdentityMap, MappingMode,
    OffsetMap, CAN_ID_EXTENDED_FLAG, NO_STD_CAN_IDS,
};
pub use port::{DispatcherPort, SenderPort};
pub use sender::Sender;
pub use system::DispatcherSystem;
pub use timer::{TimerHandle, TIMER_CONTEXT_SIZE};

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests;
