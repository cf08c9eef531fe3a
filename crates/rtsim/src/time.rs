//! Virtual clock and software timers.
//!
//! Time only moves when a test calls [`Kernel::advance_time`] (or
//! [`Kernel::task_delay`] while timers are initialized). Advancing walks the
//! due timers one at a time in expiry order, moving the clock to each expiry
//! before running its callback, so a callback always observes its own expiry
//! instant and sees the effect of anything an earlier callback did.

use core::any::Any;
use core::fmt;
use core::time::Duration;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::assert::{require, violation};
use crate::config::Ticks;
use crate::handle::{Arena, Handle};
use crate::kernel::Kernel;

/// Handle to a software timer.
pub type TimerHandle = Handle<Timer>;

/// Opaque per-timer value, the equivalent of a timer ID.
pub type TimerContext = Arc<dyn Any + Send + Sync>;

/// Timer expiry function. Runs on the caller of `advance_time` with full
/// access to the kernel.
pub type TimerCallback = Box<dyn FnMut(&mut Kernel, TimerHandle)>;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerBehavior {
    SingleShot,
    AutoReload,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    Dormant,
    Active,
}

/// Software timer equivalent to an RTOS timer object.
pub struct Timer {
    name: String,
    period: Duration,
    behavior: TimerBehavior,
    context: Option<TimerContext>,
    callback: Option<TimerCallback>,
    expiry: Duration,
    state: TimerState,
    sequence: u64,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("behavior", &self.behavior)
            .field("expiry", &self.expiry)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Timer {
    fn arm(&mut self, expiry: Duration) {
        self.expiry = expiry;
        self.state = TimerState::Active;
    }

    /// Applies the post-expiry transition with the clock at `now`.
    ///
    /// An auto-reload timer whose next expiry would not fit on the clock goes
    /// dormant.
    fn expire(&mut self, now: Duration) {
        match self.behavior {
            TimerBehavior::SingleShot => self.state = TimerState::Dormant,
            TimerBehavior::AutoReload => {
                while self.expiry <= now {
                    let Some(next) = self.expiry.checked_add(self.period) else {
                        log::warn!("timer {:?} reload overflows the clock", self.name);
                        self.state = TimerState::Dormant;
                        return;
                    };
                    self.expiry = next;
                }
            }
        }
    }
}

/// Clock plus the timers it drives.
pub(crate) struct TimerEngine {
    now: Duration,
    timers: Arena<Timer>,
    next_sequence: u64,
    advancing: bool,
}

impl TimerEngine {
    fn new() -> Self {
        Self {
            now: Duration::ZERO,
            timers: Arena::new(),
            next_sequence: 0,
            advancing: false,
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Earliest active timer due at or before `target`; creation order breaks
    /// ties.
    fn next_due(&self, target: Duration) -> Option<TimerHandle> {
        self.timers
            .iter()
            .filter(|(_, timer)| timer.state == TimerState::Active && timer.expiry <= target)
            .min_by_key(|(_, timer)| (timer.expiry, timer.sequence))
            .map(|(handle, _)| handle)
    }

    /// Moves the clock to `handle`'s expiry, applies its transition and hands
    /// out its callback for the duration of the call.
    fn fire(&mut self, handle: TimerHandle) -> Option<TimerCallback> {
        let timer = self.timers.get_mut(handle)?;
        self.now = timer.expiry;
        timer.expire(self.now);
        timer.callback.take()
    }

    /// Returns a callback after it ran, unless its timer was deleted.
    fn restore(&mut self, handle: TimerHandle, callback: TimerCallback) {
        if let Some(timer) = self.timers.get_mut(handle) {
            if timer.callback.is_none() {
                timer.callback = Some(callback);
            }
        }
    }
}

impl Kernel {
    /// Initializes the timer engine with the clock at zero.
    pub fn timers_init(&mut self) {
        require!(self.asserts, self.timers.is_none(), "timers initialized twice");
        self.timers = Some(TimerEngine::new());
        log::debug!("timer engine started");
    }

    /// Drops the timer engine and every timer in it.
    pub fn timers_destroy(&mut self) {
        let advancing = self.timer_engine().advancing;
        require!(
            self.asserts,
            !advancing,
            "timers destroyed from inside a timer callback"
        );
        if let Some(engine) = self.timers.take() {
            log::debug!(
                "timer engine stopped at {:?} with {} timer(s)",
                engine.now,
                engine.timers.len()
            );
        }
    }

    pub fn timers_active(&self) -> bool {
        self.timers.is_some()
    }

    /// Current virtual time; zero while timers are not initialized.
    pub fn timers_now(&self) -> Duration {
        self.timers.as_ref().map_or(Duration::ZERO, TimerEngine::now)
    }

    /// Moves virtual time forward by `duration`, firing every timer that
    /// falls due on the way.
    ///
    /// Timers fire one at a time in expiry order, ties in creation order. The
    /// clock reads each timer's own expiry while its callback runs and reads
    /// `now + duration` once this returns. Changes a callback makes to any
    /// timer apply from the next firing onwards. A timer is reloaded (or made
    /// dormant) before its callback runs, so a callback that changes its own
    /// behavior or period sees the change take effect after the expiry
    /// already scheduled.
    ///
    /// Moving the clock past [`Duration::MAX`] is a contract violation.
    pub fn advance_time(&mut self, duration: Duration) {
        let engine = self.timer_engine();
        let (advancing, now) = (engine.advancing, engine.now);
        require!(
            self.asserts,
            !advancing,
            "advance_time called from inside a timer callback"
        );
        let Some(target) = now.checked_add(duration) else {
            violation!(
                self.asserts,
                "advancing {duration:?} from {now:?} overflows the virtual clock"
            );
        };
        self.timer_engine_mut().advancing = true;

        loop {
            let Some(handle) = self.timer_engine().next_due(target) else {
                break;
            };
            let engine = self.timer_engine_mut();
            let callback = engine.fire(handle);
            log::debug!("timer {handle:?} fired at {:?}", engine.now);

            let Some(mut callback) = callback else {
                continue;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(self, handle)));
            let engine = self.timer_engine_mut();
            engine.restore(handle, callback);
            if let Err(payload) = outcome {
                engine.advancing = false;
                panic::resume_unwind(payload);
            }
        }

        let engine = self.timer_engine_mut();
        engine.now = target;
        engine.advancing = false;
    }

    /// Creates a dormant timer.
    pub fn timer_create<F>(
        &mut self,
        name: &str,
        period: Duration,
        behavior: TimerBehavior,
        context: Option<TimerContext>,
        callback: F,
    ) -> TimerHandle
    where
        F: FnMut(&mut Kernel, TimerHandle) + 'static,
    {
        require!(
            self.asserts,
            !period.is_zero(),
            "timer {name:?} created with a zero period"
        );
        let engine = self.timer_engine_mut();
        let sequence = engine.next_sequence;
        engine.next_sequence += 1;
        let handle = engine.timers.insert(Timer {
            name: name.to_owned(),
            period,
            behavior,
            context,
            callback: Some(Box::new(callback)),
            expiry: Duration::ZERO,
            state: TimerState::Dormant,
            sequence,
        });
        log::debug!("timer {name:?} created as {handle:?} ({period:?}, {behavior:?})");
        handle
    }

    /// Arms `timer` to expire one period from now.
    pub fn timer_start(&mut self, timer: TimerHandle, _wait: Ticks) {
        let period = self.timer(timer).period;
        let expiry = self.expiry_after(timer, period);
        self.timer_mut(timer).arm(expiry);
    }

    /// Disarms `timer`; it keeps its settings and can be started again.
    pub fn timer_stop(&mut self, timer: TimerHandle, _wait: Ticks) {
        self.timer_mut(timer).state = TimerState::Dormant;
    }

    /// Restarts `timer` from now with its current period.
    pub fn timer_reset(&mut self, timer: TimerHandle, wait: Ticks) {
        self.timer_start(timer, wait);
    }

    /// Sets a new period and arms `timer` one new period from now.
    pub fn timer_change_period(&mut self, timer: TimerHandle, period: Duration, _wait: Ticks) {
        require!(
            self.asserts,
            !period.is_zero(),
            "timer {timer:?} given a zero period"
        );
        let expiry = self.expiry_after(timer, period);
        let entry = self.timer_mut(timer);
        entry.period = period;
        entry.arm(expiry);
    }

    pub fn timer_delete(&mut self, timer: TimerHandle, _wait: Ticks) {
        let engine = self.timer_engine_mut();
        if engine.timers.remove(timer).is_none() {
            violation!(self.asserts, "unknown or deleted timer {timer:?}");
        }
        log::debug!("timer {timer:?} deleted");
    }

    pub fn timer_is_active(&self, timer: TimerHandle) -> bool {
        self.timer(timer).state == TimerState::Active
    }

    pub fn timer_period(&self, timer: TimerHandle) -> Duration {
        self.timer(timer).period
    }

    /// Virtual time of the next expiry; meaningful while the timer is active.
    pub fn timer_expiry(&self, timer: TimerHandle) -> Duration {
        self.timer(timer).expiry
    }

    pub fn timer_context(&self, timer: TimerHandle) -> Option<TimerContext> {
        self.timer(timer).context.clone()
    }

    pub fn timer_set_context(&mut self, timer: TimerHandle, context: Option<TimerContext>) {
        self.timer_mut(timer).context = context;
    }

    pub fn timer_name(&self, timer: TimerHandle) -> &str {
        &self.timer(timer).name
    }

    pub fn timer_behavior(&self, timer: TimerHandle) -> TimerBehavior {
        self.timer(timer).behavior
    }

    pub fn timer_set_behavior(&mut self, timer: TimerHandle, behavior: TimerBehavior) {
        self.timer_mut(timer).behavior = behavior;
    }

    /// Virtual time one `period` from now.
    fn expiry_after(&self, timer: TimerHandle, period: Duration) -> Duration {
        let now = self.timers_now();
        match now.checked_add(period) {
            Some(expiry) => expiry,
            None => violation!(
                self.asserts,
                "timer {timer:?} period {period:?} from {now:?} overflows the virtual clock"
            ),
        }
    }

    fn timer_engine(&self) -> &TimerEngine {
        match &self.timers {
            Some(engine) => engine,
            None => violation!(self.asserts, "timer engine is not initialized"),
        }
    }

    fn timer_engine_mut(&mut self) -> &mut TimerEngine {
        match &mut self.timers {
            Some(engine) => engine,
            None => violation!(self.asserts, "timer engine is not initialized"),
        }
    }

    fn timer(&self, timer: TimerHandle) -> &Timer {
        match self.timer_engine().timers.get(timer) {
            Some(entry) => entry,
            None => violation!(self.asserts, "unknown or deleted timer {timer:?}"),
        }
    }

    fn timer_mut(&mut self, timer: TimerHandle) -> &mut Timer {
        let Some(engine) = &mut self.timers else {
            violation!(self.asserts, "timer engine is not initialized");
        };
        match engine.timers.get_mut(timer) {
            Some(entry) => entry,
            None => violation!(self.asserts, "unknown or deleted timer {timer:?}"),
        }
    }
}
