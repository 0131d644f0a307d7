use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use ede_core::{event_record_size, EventHeader, EventKind, SenderHandle};

use crate::port::DispatcherPort;

mod dispatch;
mod timers;

/// Shared log of what the callbacks observed
struct Collector<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Collector<T> {
    fn push(&self, item: T) {
        self.events.lock().unwrap().push(item);
    }

    fn snapshot(&self) -> Vec<T> {
        self.events.lock().unwrap().clone()
    }
}

/// Port fed by the test instead of a producer
#[derive(Clone, Default)]
struct ScriptedPort {
    inbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
    broken: Arc<AtomicBool>,
    drops: Arc<AtomicU32>,
    current: Vec<u8>,
}

impl ScriptedPort {
    fn push_raw(&self, record: &[u8]) {
        self.inbox.lock().unwrap().push_back(record.to_vec());
    }

    fn push_event(&self, kind: EventKind, handle: SenderHandle, payload: &[u8]) {
        let mut record = std::vec![0u8; event_record_size(payload.len())];
        assert!(EventHeader::new(kind, handle).encode(payload, &mut record));
        self.push_raw(&record);
    }

    fn boxed(&self) -> Box<dyn DispatcherPort> {
        Box::new(self.clone())
    }
}

impl DispatcherPort for ScriptedPort {
    fn read(&mut self) -> Option<&[u8]> {
        self.current = self.inbox.lock().unwrap().pop_front()?;
        Some(&self.current)
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }

    fn resync(&mut self) -> bool {
        self.inbox.lock().unwrap().clear();
        self.broken.swap(false, Ordering::Relaxed)
    }

    fn drop_count(&self, reset: bool) -> u32 {
        if reset {
            self.drops.swap(0, Ordering::Relaxed)
        } else {
            self.drops.load(Ordering::Relaxed)
        }
    }
}
