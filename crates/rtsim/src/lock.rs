//! Semaphores and mutexes built on zero-size channels.
//!
//! Every lock is a channel whose records carry no bytes; the number of
//! records waiting is the lock's count. A binary semaphore starts empty, a
//! mutex starts holding its one token.

use crate::assert::require;
use crate::channel::{ChannelError, ChannelKind, ChannelResult, QueueHandle, SendPosition};
use crate::config::Ticks;
use crate::kernel::Kernel;

/// Semaphores and mutexes share the queue handle type.
pub type SemaphoreHandle = QueueHandle;

impl Kernel {
    /// Creates an empty binary semaphore.
    pub fn semaphore_create_binary(&mut self) -> SemaphoreHandle {
        self.create_channel(ChannelKind::BinarySemaphore, 1, 0)
    }

    /// Creates a counting semaphore pre-signaled `initial` times.
    pub fn semaphore_create_counting(&mut self, max: usize, initial: usize) -> SemaphoreHandle {
        require!(
            self.asserts,
            initial <= max,
            "counting semaphore initial count {initial} exceeds max {max}"
        );
        let semaphore = self.create_channel(ChannelKind::CountingSemaphore, max, 0);
        self.prefill(semaphore, initial);
        semaphore
    }

    /// Creates an unlocked mutex.
    pub fn mutex_create(&mut self) -> SemaphoreHandle {
        self.create_mutex(ChannelKind::Mutex)
    }

    /// Creates an unlocked recursive mutex.
    pub fn mutex_create_recursive(&mut self) -> SemaphoreHandle {
        self.create_mutex(ChannelKind::RecursiveMutex)
    }

    fn create_mutex(&mut self, kind: ChannelKind) -> SemaphoreHandle {
        let mutex = self.create_channel(kind, 1, 0);
        self.prefill(mutex, 1);
        self.track_mutex(mutex);
        mutex
    }

    /// Signals a semaphore or releases a mutex.
    ///
    /// Fails with [`Full`](crate::ChannelError::Full) when the count is
    /// already at its maximum. A recursive mutex only moves through
    /// [`Kernel::mutex_give_recursive`].
    pub fn semaphore_give(&mut self, semaphore: SemaphoreHandle) -> ChannelResult<()> {
        self.check_plain_lock(semaphore);
        self.queue_send(semaphore, &[], SendPosition::Back, 0)
    }

    /// Takes a semaphore or locks a mutex; never waits.
    pub fn semaphore_take(&mut self, semaphore: SemaphoreHandle, wait: Ticks) -> ChannelResult<()> {
        self.check_plain_lock(semaphore);
        self.queue_receive(semaphore, &mut [], wait)
    }

    pub fn semaphore_count(&self, semaphore: SemaphoreHandle) -> usize {
        self.check_lock(semaphore);
        self.messages_waiting(semaphore)
    }

    pub fn semaphore_delete(&mut self, semaphore: SemaphoreHandle) {
        self.check_lock(semaphore);
        self.queue_delete(semaphore);
    }

    /// Locks a recursive mutex, or deepens a lock already held.
    ///
    /// Only the first level consumes the token; nested takes always succeed.
    pub fn mutex_take_recursive(&mut self, mutex: SemaphoreHandle, wait: Ticks) -> ChannelResult<()> {
        self.check_recursive(mutex);
        if self.channel(mutex).depth == 0 {
            self.queue_receive(mutex, &mut [], wait)?;
        }
        self.channel_mut(mutex).depth += 1;
        Ok(())
    }

    /// Releases one level of a recursive mutex; the token returns with the
    /// last level.
    pub fn mutex_give_recursive(&mut self, mutex: SemaphoreHandle) -> ChannelResult<()> {
        self.check_recursive(mutex);
        let depth = self.channel(mutex).depth;
        if depth == 0 {
            log::warn!("recursive mutex {mutex:?} given while not held");
            return Err(ChannelError::NotHeld);
        }
        if depth == 1 {
            self.queue_send(mutex, &[], SendPosition::Back, 0)?;
        }
        self.channel_mut(mutex).depth = depth - 1;
        Ok(())
    }

    /// Nesting depth of a recursive mutex.
    pub fn mutex_recursion_depth(&self, mutex: SemaphoreHandle) -> usize {
        self.check_recursive(mutex);
        self.channel(mutex).depth
    }

    fn check_lock(&self, semaphore: SemaphoreHandle) {
        let kind = self.channel(semaphore).kind();
        require!(
            self.asserts,
            kind.is_lock(),
            "{kind:?} {semaphore:?} used as a semaphore"
        );
    }

    /// Like [`Self::check_lock`], minus recursive mutexes, whose token and
    /// depth must change together.
    fn check_plain_lock(&self, semaphore: SemaphoreHandle) {
        self.check_lock(semaphore);
        let kind = self.channel(semaphore).kind();
        require!(
            self.asserts,
            kind != ChannelKind::RecursiveMutex,
            "recursive mutex {semaphore:?} given or taken without the recursive calls"
        );
    }

    fn check_recursive(&self, mutex: SemaphoreHandle) {
        let kind = self.channel(mutex).kind();
        require!(
            self.asserts,
            kind == ChannelKind::RecursiveMutex,
            "{kind:?} {mutex:?} used as a recursive mutex"
        );
    }
}
