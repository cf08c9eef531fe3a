//! Simulation kernel: the context every operation runs against.

use core::fmt;

use crate::assert::{require, AssertHook, Asserts};
use crate::channel::Channel;
use crate::config::{KernelConfig, MAX_TICK_RATE_HZ};
use crate::handle::Arena;
use crate::registry::{LockRegistry, TeardownError};
use crate::task::TaskState;
use crate::time::TimerEngine;

/// Owns every channel, timer and task of one simulated system.
///
/// Operations are grouped by subsystem into the `channel`, `lock`,
/// `queue_set`, `registry`, `time` and `task` modules; all of them are
/// methods on this type. A kernel belongs to one test and is passed around
/// by `&mut`.
pub struct Kernel {
    config: KernelConfig,
    pub(crate) asserts: Asserts,
    pub(crate) channels: Arena<Channel>,
    pub(crate) mutexes: Option<LockRegistry>,
    pub(crate) timers: Option<TimerEngine>,
    pub(crate) tasks: TaskState,
}

impl Kernel {
    /// Creates a kernel and starts the subsystems `config` enables.
    ///
    /// A tick rate of zero or above [`MAX_TICK_RATE_HZ`] is a contract
    /// violation.
    pub fn new(config: KernelConfig) -> Self {
        let asserts = Asserts::new(config.assert_output, config.assert_hook.clone());
        require!(
            asserts,
            (1..=MAX_TICK_RATE_HZ).contains(&config.tick_rate_hz),
            "tick rate {} Hz outside 1..={MAX_TICK_RATE_HZ}",
            config.tick_rate_hz
        );
        let mut kernel = Self {
            config,
            asserts,
            channels: Arena::new(),
            mutexes: None,
            timers: None,
            tasks: TaskState::default(),
        };
        if kernel.config.track_mutexes {
            kernel.mutex_tracking_init();
        }
        if kernel.config.timers {
            kernel.timers_init();
        }
        log::debug!("kernel created with {:?}", kernel.config);
        kernel
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Enables or disables logging of contract violations.
    pub fn set_assert_output(&mut self, enabled: bool) {
        self.config.assert_output = enabled;
        self.asserts.set_output(enabled);
    }

    pub fn set_assert_hook(&mut self, hook: Option<AssertHook>) {
        self.config.assert_hook = hook.clone();
        self.asserts.set_hook(hook);
    }

    /// Stops every running subsystem and reports mutexes left locked.
    ///
    /// Calling it again is a no-op that succeeds.
    pub fn teardown(&mut self) -> Result<(), TeardownError> {
        if self.timers_active() {
            self.timers_destroy();
        }
        self.mutex_tracking_teardown()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("channels", &self.channels.len())
            .field("timers", &self.timers.is_some())
            .field("mutex_tracking", &self.mutexes.is_some())
            .field("tasks", &self.tasks)
            .finish()
    }
}
