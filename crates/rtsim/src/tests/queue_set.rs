use pretty_assertions::assert_eq;

use super::quiet_kernel;
use crate::assert::expect_violation;
use crate::channel::ChannelError;
use crate::kernel::Kernel;

#[test]
fn one_send_yields_exactly_one_select() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(4);
    let queue = kernel.queue_create(4, 2);
    kernel.queue_set_add(queue, set).unwrap();

    kernel.queue_send_to_back(queue, &[1, 2], 0).unwrap();

    assert_eq!(kernel.queue_set_select(set, 0), Some(queue));
    assert_eq!(kernel.queue_set_select(set, 0), None);
}

#[test]
fn select_follows_arrival_order_across_members() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(5);
    let commands = kernel.queue_create(2, 1);
    let signal = kernel.semaphore_create_binary();
    let readings = kernel.queue_create(2, 4);
    for member in [commands, signal, readings] {
        kernel.queue_set_add(member, set).unwrap();
    }

    kernel.queue_send_to_back(readings, &[0; 4], 0).unwrap();
    kernel.semaphore_give(signal).unwrap();
    kernel.queue_send_to_back(commands, &[7], 0).unwrap();
    kernel.queue_send_to_back(readings, &[1; 4], 0).unwrap();

    let order: Vec<_> = std::iter::from_fn(|| kernel.queue_set_select(set, 0)).collect();
    assert_eq!(order, vec![readings, signal, commands, readings]);
}

#[test]
fn failed_send_posts_nothing() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(2);
    let queue = kernel.queue_create(1, 1);
    kernel.queue_set_add(queue, set).unwrap();

    kernel.queue_send_to_back(queue, &[1], 0).unwrap();
    assert_eq!(kernel.queue_send_to_back(queue, &[2], 0), Err(ChannelError::Full));
    assert_eq!(kernel.messages_waiting(set), 1);
}

#[test]
fn member_with_pending_records_cannot_join() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(2);
    let queue = kernel.queue_create(2, 1);
    kernel.queue_send_to_back(queue, &[1], 0).unwrap();

    assert_eq!(kernel.queue_set_add(queue, set), Err(ChannelError::PendingContent));

    let mut out = [0u8];
    kernel.queue_receive(queue, &mut out, 0).unwrap();
    assert_eq!(kernel.queue_set_add(queue, set), Ok(()));
}

#[test]
fn a_channel_joins_at_most_one_set() {
    let mut kernel = Kernel::default();
    let first = kernel.queue_set_create(1);
    let second = kernel.queue_set_create(1);
    let queue = kernel.queue_create(1, 1);

    kernel.queue_set_add(queue, first).unwrap();
    assert_eq!(kernel.queue_set_add(queue, first), Err(ChannelError::AlreadyMember));
    assert_eq!(kernel.queue_set_add(queue, second), Err(ChannelError::AlreadyMember));
}

#[test]
fn remove_requires_membership_and_an_empty_member() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(2);
    let other = kernel.queue_set_create(2);
    let queue = kernel.queue_create(2, 1);

    assert_eq!(kernel.queue_set_remove(queue, set), Err(ChannelError::NotMember));
    kernel.queue_set_add(queue, set).unwrap();
    assert_eq!(kernel.queue_set_remove(queue, other), Err(ChannelError::NotMember));

    kernel.queue_send_to_back(queue, &[1], 0).unwrap();
    assert_eq!(kernel.queue_set_remove(queue, set), Err(ChannelError::PendingContent));

    let mut out = [0u8];
    kernel.queue_receive(queue, &mut out, 0).unwrap();
    assert_eq!(kernel.queue_set_remove(queue, set), Ok(()));

    kernel.queue_send_to_back(queue, &[2], 0).unwrap();
    assert_eq!(kernel.messages_waiting(set), 1);
}

#[test]
fn deleted_member_is_not_a_member() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(2);
    let queue = kernel.queue_create(2, 1);
    kernel.queue_set_add(queue, set).unwrap();
    kernel.queue_delete(queue);

    assert_eq!(kernel.queue_set_remove(queue, set), Err(ChannelError::NotMember));
}

#[test]
fn deleting_a_set_releases_its_members() {
    let mut kernel = Kernel::default();
    let set = kernel.queue_set_create(2);
    let queue = kernel.queue_create(2, 1);
    kernel.queue_set_add(queue, set).unwrap();
    kernel.queue_delete(set);

    kernel.queue_send_to_back(queue, &[1], 0).unwrap();
    let replacement = kernel.queue_set_create(2);
    assert_eq!(
        kernel.queue_set_add(queue, replacement),
        Err(ChannelError::PendingContent)
    );
}

#[test]
fn sets_cannot_nest() {
    let mut kernel = quiet_kernel();
    let outer = kernel.queue_set_create(2);
    let inner = kernel.queue_set_create(2);
    let violation = expect_violation(|| kernel.queue_set_add(inner, outer));
    assert!(violation.message.contains("cannot join"), "{violation}");
}

#[test]
fn set_operations_reject_non_sets() {
    let mut kernel = quiet_kernel();
    let queue = kernel.queue_create(2, 1);
    let not_a_set = kernel.queue_create(2, 1);
    expect_violation(|| kernel.queue_set_add(queue, not_a_set));
    expect_violation(|| kernel.queue_set_select(not_a_set, 0));
}

#[test]
fn undersized_set_overflow_is_a_violation() {
    let mut kernel = quiet_kernel();
    let set = kernel.queue_set_create(1);
    let queue = kernel.queue_create(2, 1);
    kernel.queue_set_add(queue, set).unwrap();

    kernel.queue_send_to_back(queue, &[1], 0).unwrap();
    expect_violation(|| kernel.queue_send_to_back(queue, &[2], 0));
}

#[test]
fn deleting_a_member_drops_its_pending_notifications() {
    let mut kernel = quiet_kernel();
    let set = kernel.queue_set_create(4);
    let doomed = kernel.queue_create(2, 1);
    let survivor = kernel.semaphore_create_binary();
    kernel.queue_set_add(doomed, set).unwrap();
    kernel.queue_set_add(survivor, set).unwrap();

    kernel.queue_send_to_back(doomed, &[1], 0).unwrap();
    kernel.semaphore_give(survivor).unwrap();
    kernel.queue_send_to_back(doomed, &[2], 0).unwrap();
    kernel.queue_delete(doomed);

    assert_eq!(kernel.messages_waiting(set), 1);
    assert_eq!(kernel.queue_set_select(set, 0), Some(survivor));
    assert_eq!(kernel.queue_set_select(set, 0), None);
    expect_violation(|| kernel.messages_waiting(doomed));
}
