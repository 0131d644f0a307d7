//! Sizing of the CAN interface

/// Configuration of a [`CanInterface`](crate::CanInterface)
///
/// Every bus and frame becomes an external event source of the dispatcher it
/// is registered with, so each dispatcher is dimensioned to hold all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanConfig {
    pub no_dispatchers: usize,
    pub max_buses: usize,
    pub max_frames: usize,
    /// Timers per dispatcher
    pub max_timers: usize,
    /// Events a dispatcher queue holds when all carry the maximum payload
    pub queue_len: usize,
    /// Largest payload of a posted event in bytes
    pub max_payload: usize,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            no_dispatchers: 1,
            max_buses: 1,
            max_frames: 32,
            max_timers: 32,
            queue_len: 16,
            max_payload: 8,
        }
    }
}

impl CanConfig {
    /// Creates a new CAN configuration builder.
    pub fn builder() -> CanConfigBuilder {
        CanConfigBuilder::default()
    }
}

/// Builder for [`CanConfig`]
#[derive(Debug, Clone, Default)]
pub struct CanConfigBuilder {
    config: CanConfig,
}

impl CanConfigBuilder {
    /// Sets the number of dispatchers.
    pub fn no_dispatchers(mut self, no: usize) -> Self {
        self.config.no_dispatchers = no;
        self
    }

    /// Sets the number of buses.
    pub fn max_buses(mut self, max: usize) -> Self {
        self.config.max_buses = max;
        self
    }

    /// Sets the maximum number of frames.
    pub fn max_frames(mut self, max: usize) -> Self {
        self.config.max_frames = max;
        self
    }

    /// Sets the number of timers per dispatcher.
    pub fn max_timers(mut self, max: usize) -> Self {
        self.config.max_timers = max;
        self
    }

    /// Sets the length of the dispatcher queues.
    pub fn queue_len(mut self, len: usize) -> Self {
        self.config.queue_len = len;
        self
    }

    /// Sets the maximum payload of an event.
    pub fn max_payload(mut self, max: usize) -> Self {
        self.config.max_payload = max;
        self
    }

    /// Builds the CAN configuration.
    pub fn build(self) -> CanConfig {
        self.config
    }
}
