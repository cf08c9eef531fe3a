//! Fatal contract checks and the hook that lets a test harness observe them.
//!
//! Misuse that real firmware would treat as unrecoverable (a stale handle, a
//! semaphore passed where a queue set is expected, initializing a subsystem
//! twice) never comes back as an ordinary return value. The kernel reports it
//! through the installed [`AssertHook`], then unwinds with a
//! [`ContractViolation`] payload. [`catch_violation`] stops that unwind at the
//! boundary of a single closure, which is how a test asserts that a call is
//! rejected without aborting the rest of the run.

use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

/// Details of a failed contract check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    pub file: &'static str,
    pub line: u32,
    pub message: String,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contract violation ({}:{}): {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for ContractViolation {}

/// Callback invoked with every violation before the kernel unwinds.
pub type AssertHook = Arc<dyn Fn(&ContractViolation) + Send + Sync>;

/// Assertion state carried by the kernel.
pub(crate) struct Asserts {
    output: bool,
    hook: Option<AssertHook>,
}

impl Asserts {
    pub fn new(output: bool, hook: Option<AssertHook>) -> Self {
        Self { output, hook }
    }

    pub fn set_output(&mut self, enabled: bool) {
        self.output = enabled;
    }

    pub fn set_hook(&mut self, hook: Option<AssertHook>) {
        self.hook = hook;
    }

    pub fn fail(&self, file: &'static str, line: u32, message: fmt::Arguments<'_>) -> ! {
        let violation = ContractViolation {
            file,
            line,
            message: message.to_string(),
        };
        if self.output {
            log::error!("{violation}");
        }
        if let Some(hook) = &self.hook {
            hook(&violation);
        }
        panic::panic_any(violation)
    }
}

/// Raises a contract violation through an [`Asserts`] value.
macro_rules! violation {
    ($asserts:expr, $($arg:tt)+) => {
        $asserts.fail(file!(), line!(), format_args!($($arg)+))
    };
}

/// Raises a contract violation unless `$cond` holds.
macro_rules! require {
    ($asserts:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::assert::violation!($asserts, $($arg)+)
        }
    };
}

pub(crate) use {require, violation};

/// Runs `f`, turning a contract violation raised inside it into `Err`.
///
/// Panics that do not carry a [`ContractViolation`] keep unwinding.
pub fn catch_violation<R>(f: impl FnOnce() -> R) -> Result<R, ContractViolation> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<ContractViolation>() {
            Ok(violation) => Err(*violation),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Runs `f` and returns the violation it raised.
///
/// # Panics
///
/// Panics if `f` completes without violating a contract.
#[track_caller]
pub fn expect_violation<R>(f: impl FnOnce() -> R) -> ContractViolation {
    match catch_violation(f) {
        Ok(_) => panic!("expected a contract violation, but the call completed"),
        Err(violation) => violation,
    }
}

/// Shared log of every violation seen by the hook it produces.
#[derive(Clone, Default)]
pub struct ViolationRecorder {
    seen: Arc<Mutex<Vec<ContractViolation>>>,
}

impl ViolationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook to install on a kernel; records into this recorder.
    pub fn hook(&self) -> AssertHook {
        let seen = Arc::clone(&self.seen);
        Arc::new(move |violation: &ContractViolation| seen.lock().push(violation.clone()))
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last(&self) -> Option<ContractViolation> {
        self.seen.lock().last().cloned()
    }

    pub fn take(&self) -> Vec<ContractViolation> {
        core::mem::take(&mut *self.seen.lock())
    }
}
