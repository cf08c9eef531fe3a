//! Mutex registry for still-locked detection at test teardown.
//!
//! While tracking is active every mutex created through the kernel is
//! registered, and stays registered until it is deleted. Unlocking does not
//! unregister: a test that forgets the final give is caught by
//! [`Kernel::mutex_tracking_teardown`], not at the point of misuse.

use thiserror::Error;

use crate::assert::require;
use crate::channel::QueueHandle;
use crate::kernel::Kernel;

/// Failure reported when a test case is torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeardownError {
    #[error("{count} mutex(es) still locked at teardown; every mutex must be unlocked")]
    MutexStillLocked { count: usize },
}

/// Live mutex-type channels, in creation order.
#[derive(Debug, Default)]
pub(crate) struct LockRegistry {
    mutexes: Vec<QueueHandle>,
}

impl LockRegistry {
    pub fn register(&mut self, mutex: QueueHandle) {
        self.mutexes.push(mutex);
    }

    pub fn unregister(&mut self, mutex: QueueHandle) {
        self.mutexes.retain(|tracked| *tracked != mutex);
    }

    pub fn iter(&self) -> impl Iterator<Item = QueueHandle> + '_ {
        self.mutexes.iter().copied()
    }
}

impl Kernel {
    /// Starts registering mutexes.
    pub fn mutex_tracking_init(&mut self) {
        require!(
            self.asserts,
            self.mutexes.is_none(),
            "mutex tracking initialized twice"
        );
        self.mutexes = Some(LockRegistry::default());
        log::debug!("mutex tracking started");
    }

    pub fn mutex_tracking_active(&self) -> bool {
        self.mutexes.is_some()
    }

    /// Stops tracking and reports any mutex still locked.
    ///
    /// Succeeds trivially when tracking was never started.
    pub fn mutex_tracking_teardown(&mut self) -> Result<(), TeardownError> {
        let count = self.locked_mutexes().len();
        if self.mutexes.take().is_none() {
            return Ok(());
        }
        log::debug!("mutex tracking stopped");
        if count > 0 {
            log::warn!("{count} mutex(es) still locked at teardown");
            return Err(TeardownError::MutexStillLocked { count });
        }
        Ok(())
    }

    /// True when any tracked mutex is locked.
    pub fn is_any_mutex_locked(&self) -> bool {
        !self.locked_mutexes().is_empty()
    }

    /// Tracked mutexes that are currently locked.
    pub fn locked_mutexes(&self) -> Vec<QueueHandle> {
        let Some(registry) = &self.mutexes else {
            return Vec::new();
        };
        registry
            .iter()
            .filter(|mutex| {
                self.channels
                    .get(*mutex)
                    .is_some_and(|channel| channel.is_locked())
            })
            .collect()
    }

    pub(crate) fn track_mutex(&mut self, mutex: QueueHandle) {
        if let Some(registry) = &mut self.mutexes {
            registry.register(mutex);
        }
    }

    pub(crate) fn forget_mutex(&mut self, mutex: QueueHandle) {
        if let Some(registry) = &mut self.mutexes {
            registry.unregister(mutex);
        }
    }
}
