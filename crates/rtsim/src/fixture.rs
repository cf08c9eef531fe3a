//! Per-test setup and teardown.

use core::ops::{Deref, DerefMut};

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::registry::TeardownError;

/// A kernel bound to the lifetime of one test case.
///
/// Dropping the fixture tears the kernel down and fails the test if a mutex
/// was left locked. Use [`Fixture::finish`] to inspect the result instead.
///
/// ```
/// use rtsim::Fixture;
///
/// let mut fx = Fixture::new();
/// let mutex = fx.mutex_create();
/// fx.semaphore_take(mutex, 0).unwrap();
/// fx.semaphore_give(mutex).unwrap();
/// ```
#[derive(Debug)]
pub struct Fixture {
    kernel: Kernel,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            kernel: Kernel::new(config),
        }
    }

    /// Tears the kernel down now and returns the outcome.
    pub fn finish(mut self) -> Result<(), TeardownError> {
        self.kernel.teardown()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Fixture {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}

impl DerefMut for Fixture {
    fn deref_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if let Err(err) = self.kernel.teardown() {
            panic!("test teardown failed: {err}");
        }
    }
}
