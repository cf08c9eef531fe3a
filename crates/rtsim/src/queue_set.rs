//! Queue sets: select across many channels without blocking.
//!
//! A set is itself a channel whose records are member handles. Each
//! successful send into a member appends that member's handle to the set, so
//! [`Kernel::queue_set_select`] returns members in strict arrival order and
//! exactly once per send. Sets never join other sets, which keeps
//! notification chains one level deep.

use crate::assert::{require, violation};
use crate::channel::{ChannelError, ChannelKind, ChannelResult, QueueHandle, SendPosition};
use crate::config::Ticks;
use crate::handle::Handle;
use crate::kernel::Kernel;

pub type QueueSetHandle = QueueHandle;

const RECORD_SIZE: usize = core::mem::size_of::<usize>();

impl Kernel {
    /// Creates a set able to hold `capacity` pending notifications.
    pub fn queue_set_create(&mut self, capacity: usize) -> QueueSetHandle {
        self.create_channel(ChannelKind::Set, capacity, RECORD_SIZE)
    }

    /// Binds `member` to `set`.
    ///
    /// A member that already has records would never be announced, so it is
    /// refused with [`ChannelError::PendingContent`].
    pub fn queue_set_add(&mut self, member: QueueHandle, set: QueueSetHandle) -> ChannelResult<()> {
        self.check_set(set);
        let channel = self.channel(member);
        require!(
            self.asserts,
            channel.kind() != ChannelKind::Set,
            "queue set {member:?} cannot join another set"
        );
        if channel.container.is_some() {
            return Err(ChannelError::AlreadyMember);
        }
        if !channel.is_empty() {
            return Err(ChannelError::PendingContent);
        }
        self.channel_mut(member).container = Some(set);
        log::debug!("{member:?} added to queue set {set:?}");
        Ok(())
    }

    /// Unbinds `member` from `set`; the member must be drained first.
    pub fn queue_set_remove(
        &mut self,
        member: QueueHandle,
        set: QueueSetHandle,
    ) -> ChannelResult<()> {
        self.check_set(set);
        let Some(channel) = self.channels.get_mut(member) else {
            return Err(ChannelError::NotMember);
        };
        if channel.container != Some(set) {
            return Err(ChannelError::NotMember);
        }
        if !channel.is_empty() {
            return Err(ChannelError::PendingContent);
        }
        channel.container = None;
        log::debug!("{member:?} removed from queue set {set:?}");
        Ok(())
    }

    /// Returns the member whose send is the oldest unconsumed notification.
    pub fn queue_set_select(&mut self, set: QueueSetHandle, wait: Ticks) -> Option<QueueHandle> {
        self.check_set(set);
        let mut record = [0u8; RECORD_SIZE];
        self.queue_receive(set, &mut record, wait).ok()?;
        match Handle::from_bytes(&record) {
            Some(member) => Some(member),
            None => violation!(self.asserts, "queue set {set:?} holds a corrupt record"),
        }
    }

    /// Posts `member` to `set` after a successful send into `member`.
    pub(crate) fn notify_set(&mut self, set: QueueSetHandle, member: QueueHandle) {
        require!(
            self.asserts,
            self.channels.contains(set),
            "{member:?} belongs to deleted queue set {set:?}"
        );
        let record = member.to_bytes();
        if self.queue_send(set, &record, SendPosition::Back, 0).is_err() {
            violation!(
                self.asserts,
                "queue set {set:?} overflowed; size it for every member's capacity"
            );
        }
    }

    /// Removes every pending notification `member` posted to `set`.
    pub(crate) fn forget_notifications(&mut self, set: QueueSetHandle, member: QueueHandle) {
        let Some(channel) = self.channels.get_mut(set) else {
            return;
        };
        let before = channel.len();
        channel.retain_records(|record| Handle::from_bytes(record) != Some(member));
        let dropped = before - channel.len();
        if dropped > 0 {
            log::debug!("dropped {dropped} notification(s) of deleted {member:?} from set {set:?}");
        }
    }

    /// Detaches every member of a set that is going away.
    pub(crate) fn unbind_members(&mut self, set: QueueSetHandle) {
        for (_, channel) in self.channels.iter_mut() {
            if channel.container == Some(set) {
                channel.container = None;
            }
        }
    }

    fn check_set(&self, set: QueueSetHandle) {
        let kind = self.channel(set).kind();
        require!(self.asserts, kind == ChannelKind::Set, "{kind:?} {set:?} used as a queue set");
    }
}
