//! Bounded record channels, the storage under every queue, semaphore, mutex
//! and queue set.
//!
//! A channel holds up to `capacity` records of exactly `record_size` bytes.
//! Sends copy the caller's bytes in, receives copy them back out; nothing is
//! shared by reference. No operation ever waits: the wait argument exists so
//! call sites read like their firmware counterparts and is otherwise ignored.

use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assert::{require, violation};
use crate::config::Ticks;
use crate::handle::Handle;
use crate::kernel::Kernel;

/// Handle to any channel: queue, semaphore, mutex or queue set.
pub type QueueHandle = Handle<Channel>;

/// What a channel is used as. Lock and set operations check this.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Queue,
    Set,
    BinarySemaphore,
    CountingSemaphore,
    Mutex,
    RecursiveMutex,
}

impl ChannelKind {
    pub fn is_lock(self) -> bool {
        !matches!(self, Self::Queue | Self::Set)
    }

    pub fn is_mutex(self) -> bool {
        matches!(self, Self::Mutex | Self::RecursiveMutex)
    }
}

/// Where a send places its record.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendPosition {
    Back,
    Front,
    /// Replace the only record of a capacity-1 channel.
    Overwrite,
}

/// Recoverable failures of channel, lock and queue set operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel is full")]
    Full,
    #[error("channel is empty")]
    Empty,
    #[error("channel already belongs to a queue set")]
    AlreadyMember,
    #[error("channel still has pending records")]
    PendingContent,
    #[error("channel is not a member of this queue set")]
    NotMember,
    #[error("recursive mutex is not held")]
    NotHeld,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

pub struct Channel {
    kind: ChannelKind,
    capacity: usize,
    record_size: usize,
    records: VecDeque<Box<[u8]>>,
    pub(crate) container: Option<QueueHandle>,
    name: Option<String>,
    pub(crate) depth: usize,
}

impl Channel {
    fn new(kind: ChannelKind, capacity: usize, record_size: usize) -> Self {
        Self {
            kind,
            capacity,
            record_size,
            records: VecDeque::with_capacity(capacity),
            container: None,
            name: None,
            depth: 0,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A mutex is locked while its token is out, a recursive one also while
    /// any nesting level is held.
    pub(crate) fn is_locked(&self) -> bool {
        match self.kind {
            ChannelKind::Mutex => self.records.is_empty(),
            ChannelKind::RecursiveMutex => self.depth > 0 || self.records.is_empty(),
            _ => false,
        }
    }

    /// Drops every record `keep` rejects, preserving the order of the rest.
    pub(crate) fn retain_records(&mut self, mut keep: impl FnMut(&[u8]) -> bool) {
        self.records.retain(|record| keep(record));
    }

    fn push(&mut self, record: &[u8], position: SendPosition) -> ChannelResult<()> {
        if position != SendPosition::Overwrite && self.records.len() >= self.capacity {
            return Err(ChannelError::Full);
        }
        let record: Box<[u8]> = record.into();
        match position {
            SendPosition::Back => self.records.push_back(record),
            SendPosition::Front => self.records.push_front(record),
            // empty channel: plain insert, there is nothing to replace
            SendPosition::Overwrite => {
                self.records.pop_front();
                self.records.push_front(record);
            }
        }
        Ok(())
    }

    fn pop_into(&mut self, out: &mut [u8]) -> ChannelResult<()> {
        let record = self.records.pop_front().ok_or(ChannelError::Empty)?;
        out[..record.len()].copy_from_slice(&record);
        Ok(())
    }

    fn peek_into(&self, out: &mut [u8]) -> ChannelResult<()> {
        let record = self.records.front().ok_or(ChannelError::Empty)?;
        out[..record.len()].copy_from_slice(record);
        Ok(())
    }
}

impl Kernel {
    /// Creates a queue of `capacity` records, each `record_size` bytes.
    pub fn queue_create(&mut self, capacity: usize, record_size: usize) -> QueueHandle {
        self.create_channel(ChannelKind::Queue, capacity, record_size)
    }

    pub(crate) fn create_channel(
        &mut self,
        kind: ChannelKind,
        capacity: usize,
        record_size: usize,
    ) -> QueueHandle {
        require!(self.asserts, capacity > 0, "{kind:?} created with zero capacity");
        let handle = self.channels.insert(Channel::new(kind, capacity, record_size));
        log::trace!("created {kind:?} {handle:?} ({capacity} x {record_size} bytes)");
        handle
    }

    /// Deletes `queue`. A queue still bound to a set takes its pending
    /// notifications out of that set with it.
    pub fn queue_delete(&mut self, queue: QueueHandle) {
        let channel = self.channel(queue);
        let (kind, container) = (channel.kind, channel.container);
        if let Some(set) = container {
            self.forget_notifications(set, queue);
        }
        if kind.is_mutex() {
            self.forget_mutex(queue);
        }
        if kind == ChannelKind::Set {
            self.unbind_members(queue);
        }
        self.channels.remove(queue);
        log::trace!("deleted {kind:?} {queue:?}");
    }

    /// Copies `record` into `queue` at `position`.
    ///
    /// When `queue` belongs to a queue set, a successful send also posts the
    /// queue's handle to the back of the set.
    pub fn queue_send(
        &mut self,
        queue: QueueHandle,
        record: &[u8],
        position: SendPosition,
        _wait: Ticks,
    ) -> ChannelResult<()> {
        let channel = self.channel(queue);
        let (record_size, capacity) = (channel.record_size, channel.capacity);
        require!(
            self.asserts,
            record.len() == record_size,
            "record of {} bytes sent to {queue:?} expecting {record_size}",
            record.len()
        );
        require!(
            self.asserts,
            position != SendPosition::Overwrite || capacity == 1,
            "overwrite requires a capacity-1 channel, {queue:?} holds {capacity}"
        );

        let channel = self.channel_mut(queue);
        channel.push(record, position)?;
        log::trace!("send {queue:?} {position:?} ({}/{capacity})", channel.len());

        let container = channel.container;
        if let Some(set) = container {
            self.notify_set(set, queue);
        }
        Ok(())
    }

    pub fn queue_send_to_back(
        &mut self,
        queue: QueueHandle,
        record: &[u8],
        wait: Ticks,
    ) -> ChannelResult<()> {
        self.queue_send(queue, record, SendPosition::Back, wait)
    }

    pub fn queue_send_to_front(
        &mut self,
        queue: QueueHandle,
        record: &[u8],
        wait: Ticks,
    ) -> ChannelResult<()> {
        self.queue_send(queue, record, SendPosition::Front, wait)
    }

    /// Replaces the record held by a capacity-1 queue. Always succeeds.
    pub fn queue_overwrite(&mut self, queue: QueueHandle, record: &[u8]) -> ChannelResult<()> {
        self.queue_send(queue, record, SendPosition::Overwrite, 0)
    }

    /// Moves the front record of `queue` into `out`.
    pub fn queue_receive(
        &mut self,
        queue: QueueHandle,
        out: &mut [u8],
        _wait: Ticks,
    ) -> ChannelResult<()> {
        self.check_output(queue, out.len());
        let channel = self.channel_mut(queue);
        channel.pop_into(out)?;
        log::trace!("receive {queue:?} ({}/{})", channel.len(), channel.capacity);
        Ok(())
    }

    /// Copies the front record of `queue` into `out` without removing it.
    pub fn queue_peek(&self, queue: QueueHandle, out: &mut [u8], _wait: Ticks) -> ChannelResult<()> {
        self.check_output(queue, out.len());
        self.channel(queue).peek_into(out)
    }

    pub fn messages_waiting(&self, queue: QueueHandle) -> usize {
        self.channel(queue).len()
    }

    pub fn spaces_available(&self, queue: QueueHandle) -> usize {
        let channel = self.channel(queue);
        channel.capacity - channel.len()
    }

    pub fn queue_kind(&self, queue: QueueHandle) -> ChannelKind {
        self.channel(queue).kind
    }

    /// Attaches a diagnostic name to `queue`.
    pub fn queue_add_to_registry(&mut self, queue: QueueHandle, name: &str) {
        self.channel_mut(queue).name = Some(name.to_owned());
    }

    pub fn queue_name(&self, queue: QueueHandle) -> Option<&str> {
        self.channel(queue).name.as_deref()
    }

    pub fn queue_unregister(&mut self, queue: QueueHandle) {
        self.channel_mut(queue).name = None;
    }

    /// Number of live channels of every kind.
    pub fn queue_count(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn channel(&self, queue: QueueHandle) -> &Channel {
        match self.channels.get(queue) {
            Some(channel) => channel,
            None => violation!(self.asserts, "unknown or deleted channel {queue:?}"),
        }
    }

    pub(crate) fn channel_mut(&mut self, queue: QueueHandle) -> &mut Channel {
        match self.channels.get_mut(queue) {
            Some(channel) => channel,
            None => violation!(self.asserts, "unknown or deleted channel {queue:?}"),
        }
    }

    /// Seeds a freshly created channel without set notification.
    pub(crate) fn prefill(&mut self, queue: QueueHandle, count: usize) {
        let channel = self.channel_mut(queue);
        for _ in 0..count {
            if channel.push(&[], SendPosition::Back).is_err() {
                break;
            }
        }
    }

    fn check_output(&self, queue: QueueHandle, len: usize) {
        let record_size = self.channel(queue).record_size;
        require!(
            self.asserts,
            len >= record_size,
            "output buffer of {len} bytes too small for {queue:?} records of {record_size}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_on_empty_channel_inserts() {
        let mut channel = Channel::new(ChannelKind::Queue, 1, 2);
        channel.push(&[1, 2], SendPosition::Overwrite).unwrap();
        assert_eq!(channel.len(), 1);

        let mut out = [0u8; 2];
        channel.peek_into(&mut out).unwrap();
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn front_send_jumps_the_queue() {
        let mut channel = Channel::new(ChannelKind::Queue, 3, 1);
        channel.push(&[1], SendPosition::Back).unwrap();
        channel.push(&[2], SendPosition::Front).unwrap();

        let mut out = [0u8; 1];
        channel.pop_into(&mut out).unwrap();
        assert_eq!(out, [2]);
        channel.pop_into(&mut out).unwrap();
        assert_eq!(out, [1]);
        assert_eq!(channel.pop_into(&mut out), Err(ChannelError::Empty));
    }

    #[test]
    fn mutex_lock_state_follows_token_and_depth() {
        let mut mutex = Channel::new(ChannelKind::RecursiveMutex, 1, 0);
        assert!(mutex.is_locked());
        mutex.push(&[], SendPosition::Back).unwrap();
        assert!(!mutex.is_locked());
        mutex.depth = 1;
        assert!(mutex.is_locked());

        let queue = Channel::new(ChannelKind::Queue, 1, 0);
        assert!(!queue.is_locked());
    }
}
