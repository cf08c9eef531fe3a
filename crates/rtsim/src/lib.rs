//! # rtsim
//!
//! A host-side simulation of a small real-time kernel's inter-task services,
//! for unit testing firmware logic on a development machine. Nothing blocks
//! and no threads are spawned: queues, semaphores and mutexes are bounded
//! record channels, software timers run on a virtual clock that moves only
//! when a test says so, and misuse is reported as a typed, catchable
//! contract violation.
//!
//! ## Module Overview
//! - [`handle`]    – Generation-checked handles and their raw encoding.
//! - [`assert`]    – Contract violations and the hook that observes them.
//! - [`config`]    – Kernel configuration and tick arithmetic.
//! - [`kernel`]    – The context object every operation runs against.
//! - [`channel`]   – Bounded record queues.
//! - [`lock`]      – Semaphores and (recursive) mutexes.
//! - [`queue_set`] – Multiplexing many channels into one select.
//! - [`registry`]  – Still-locked mutex detection at teardown.
//! - [`time`]      – Virtual clock and software timers.
//! - [`task`]      – Inert task stand-ins and the tick counter.
//! - [`fixture`]   – RAII setup and teardown for one test.

pub mod assert;
pub mod channel;
pub mod config;
pub mod fixture;
pub mod handle;
pub mod kernel;
pub mod lock;
pub mod queue_set;
pub mod registry;
pub mod task;
pub mod time;

pub use assert::{
    catch_violation, expect_violation, AssertHook, ContractViolation, ViolationRecorder,
};
pub use channel::{Channel, ChannelError, ChannelKind, ChannelResult, QueueHandle, SendPosition};
pub use config::{KernelConfig, KernelConfigBuilder, Ticks, MAX_DELAY, MAX_TICK_RATE_HZ};
pub use fixture::Fixture;
pub use handle::Handle;
pub use kernel::Kernel;
pub use lock::SemaphoreHandle;
pub use queue_set::QueueSetHandle;
pub use registry::TeardownError;
pub use task::{TaskHandle, TaskInfo};
pub use time::{Timer, TimerBehavior, TimerCallback, TimerContext, TimerHandle, TimerState};
#[cfg(test)]
mod tests;
