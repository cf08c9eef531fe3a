//! Kernel configuration and tick arithmetic.

use core::fmt;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::assert::AssertHook;

/// Kernel tick count, the unit of every wait and delay parameter.
pub type Ticks = u32;

/// Wait forever. Accepted everywhere a wait is, and ignored like any other.
pub const MAX_DELAY: Ticks = Ticks::MAX;

/// Fastest tick a kernel accepts; one tick must last at least a nanosecond.
pub const MAX_TICK_RATE_HZ: u32 = 1_000_000_000;

/// Configuration for a simulation [`Kernel`](crate::Kernel).
///
/// Selects which subsystems are initialized on construction and how ticks map
/// onto virtual time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone)]
pub struct KernelConfig {
    pub tick_rate_hz: u32,
    pub assert_output: bool,
    pub track_mutexes: bool,
    pub timers: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub assert_hook: Option<AssertHook>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1000,
            assert_output: true,
            track_mutexes: true,
            timers: true,
            assert_hook: None,
        }
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("tick_rate_hz", &self.tick_rate_hz)
            .field("assert_output", &self.assert_output)
            .field("track_mutexes", &self.track_mutexes)
            .field("timers", &self.timers)
            .field("assert_hook", &self.assert_hook.is_some())
            .finish()
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Length of one tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    pub fn ticks_to_duration(&self, ticks: Ticks) -> Duration {
        self.tick_period() * ticks
    }

    /// Whole ticks elapsed in `duration`, saturating at [`Ticks::MAX`].
    pub fn duration_to_ticks(&self, duration: Duration) -> Ticks {
        let ticks = duration.as_nanos() / self.tick_period().as_nanos();
        Ticks::try_from(ticks).unwrap_or(Ticks::MAX)
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the tick rate used to convert ticks into virtual time.
    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Enables or disables logging of contract violations.
    pub fn assert_output(mut self, enabled: bool) -> Self {
        self.config.assert_output = enabled;
        self
    }

    /// Starts mutex tracking when the kernel is created.
    pub fn track_mutexes(mut self, enabled: bool) -> Self {
        self.config.track_mutexes = enabled;
        self
    }

    /// Initializes the timer engine when the kernel is created.
    pub fn timers(mut self, enabled: bool) -> Self {
        self.config.timers = enabled;
        self
    }

    /// Installs a hook that observes every contract violation.
    pub fn assert_hook(mut self, hook: AssertHook) -> Self {
        self.config.assert_hook = Some(hook);
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}
