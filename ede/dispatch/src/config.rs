//! Sizing of the dispatcher system

/// Configuration of a dispatcher system
///
/// All capacities are fixed when the system is created; nothing grows later.
/// The source and timer limits apply to each dispatcher separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    pub no_dispatchers: usize,
    pub max_external_sources: usize,
    pub max_internal_sources: usize,
    pub max_timers: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            no_dispatchers: 1,
            max_external_sources: 16,
            max_internal_sources: 4,
            max_timers: 16,
        }
    }
}

impl SystemConfig {
    /// Creates a new system configuration builder.
    pub fn builder() -> SystemConfigBuilder {
        SystemConfigBuilder::default()
    }
}

/// Builder for [`SystemConfig`]
#[derive(Debug, Clone, Default)]
pub struct SystemConfigBuilder {
    config: SystemConfig,
}

impl SystemConfigBuilder {
    /// Sets the number of dispatchers.
    pub fn no_dispatchers(mut self, no: usize) -> Self {
        self.config.no_dispatchers = no;
        self
    }

    /// Sets the maximum number of external event sources per dispatcher.
    pub fn max_external_sources(mut self, max: usize) -> Self {
        self.config.max_external_sources = max;
        self
    }

    /// Sets the maximum number of internal event sources per dispatcher.
    pub fn max_internal_sources(mut self, max: usize) -> Self {
        self.config.max_internal_sources = max;
        self
    }

    /// Sets the default maximum number of timers per dispatcher.
    pub fn max_timers(mut self, max: usize) -> Self {
        self.config.max_timers = max;
        self
    }

    /// Builds the system configuration.
    pub fn build(self) -> SystemConfig {
        self.config
    }
}

/// Configuration of a single dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Time between two calls of the dispatcher's main function
    ///
    /// The unit is the application's choice, typically a millisecond; all
    /// timer operations use the same unit.
    pub tick_period: u32,
    /// Overrides [`SystemConfig::max_timers`] for this dispatcher
    pub max_timers: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_period: 1,
            max_timers: None,
        }
    }
}

impl DispatcherConfig {
    /// Creates a new dispatcher configuration builder.
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    /// Configuration with the given tick period and default limits
    pub fn with_tick(tick_period: u32) -> Self {
        Self {
            tick_period,
            ..Self::default()
        }
    }
}

/// Builder for [`DispatcherConfig`]
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    /// Sets the tick period.
    pub fn tick_period(mut self, tick_period: u32) -> Self {
        self.config.tick_period = tick_period;
        self
    }

    /// Sets the maximum number of timers of this dispatcher.
    pub fn max_timers(mut self, max: usize) -> Self {
        self.config.max_timers = Some(max);
        self
    }

    /// Builds the dispatcher configuration.
    pub fn build(self) -> DispatcherConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SystemConfig::builder()
            .no_dispatchers(2)
            .max_external_sources(3)
            .build();
        assert_eq!(config.no_dispatchers, 2);
        assert_eq!(config.max_external_sources, 3);
        assert_eq!(config.max_internal_sources, SystemConfig::default().max_internal_sources);

        let disp = DispatcherConfig::builder().tick_period(10).max_timers(2).build();
        assert_eq!(disp, DispatcherConfig { tick_period: 10, max_timers: Some(2) });
    }
}
