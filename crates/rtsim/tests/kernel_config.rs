//! Tests for KernelConfig builder and kernel lifecycle.

use std::sync::Arc;
use std::time::Duration;

use rtsim::{
    catch_violation, expect_violation, Fixture, Kernel, KernelConfig, TeardownError,
    ViolationRecorder, MAX_TICK_RATE_HZ,
};

#[test]
fn kernel_config_builder() {
    let config = KernelConfig::builder()
        .tick_rate_hz(250)
        .assert_output(false)
        .track_mutexes(false)
        .timers(false)
        .build();

    assert_eq!(config.tick_rate_hz, 250);
    assert!(!config.assert_output);
    assert!(!config.track_mutexes);
    assert!(!config.timers);
    assert!(config.assert_hook.is_none());
    assert_eq!(config.tick_period(), Duration::from_millis(4));
}

#[test]
fn kernel_config_default() {
    let config = KernelConfig::default();

    assert_eq!(config.tick_rate_hz, 1000);
    assert!(config.assert_output);
    assert!(config.track_mutexes);
    assert!(config.timers);
}

#[test]
fn kernel_starts_configured_subsystems() {
    let kernel = Kernel::default();
    assert!(kernel.timers_active());
    assert!(kernel.mutex_tracking_active());

    let bare = Kernel::new(
        KernelConfig::builder()
            .track_mutexes(false)
            .timers(false)
            .build(),
    );
    assert!(!bare.timers_active());
    assert!(!bare.mutex_tracking_active());
    assert_eq!(bare.config().tick_rate_hz, 1000);
}

#[test]
fn tick_rate_must_leave_a_nonzero_tick() {
    for hz in [0, MAX_TICK_RATE_HZ + 1, 2_000_000_000] {
        let config = KernelConfig::builder()
            .tick_rate_hz(hz)
            .assert_output(false)
            .build();
        let violation = expect_violation(|| Kernel::new(config));
        assert!(violation.message.contains("tick rate"), "{violation}");
    }

    let mut fastest = Kernel::new(
        KernelConfig::builder()
            .tick_rate_hz(MAX_TICK_RATE_HZ)
            .build(),
    );
    fastest.task_delay(5);
    assert_eq!(fastest.timers_now(), Duration::from_nanos(5));
    assert_eq!(fastest.tick_count(), 5);
}

#[test]
fn assert_hook_sees_every_violation() {
    let recorder = ViolationRecorder::new();
    let mut kernel = Kernel::new(
        KernelConfig::builder()
            .assert_output(false)
            .assert_hook(recorder.hook())
            .build(),
    );
    let queue = kernel.queue_create(1, 4);
    kernel.queue_delete(queue);

    let caught = catch_violation(|| kernel.messages_waiting(queue));
    let violation = caught.unwrap_err();

    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.last(), Some(violation.clone()));
    assert!(violation.to_string().starts_with("contract violation"));

    kernel.set_assert_hook(None);
    let _ = catch_violation(|| kernel.messages_waiting(queue));
    assert_eq!(recorder.take().len(), 1);
    assert_eq!(recorder.count(), 0);
}

#[test]
fn assert_output_can_be_toggled() {
    let mut kernel = Kernel::default();
    kernel.set_assert_output(false);
    assert!(!kernel.config().assert_output);

    let hook_calls = Arc::new(parking_lot::Mutex::new(0));
    let calls = Arc::clone(&hook_calls);
    kernel.set_assert_hook(Some(Arc::new(move |_: &rtsim::ContractViolation| {
        *calls.lock() += 1;
    })));
    assert!(catch_violation(|| kernel.queue_create(0, 1)).is_err());
    assert_eq!(*hook_calls.lock(), 1);
}

#[test]
fn fixture_finish_reports_leaked_mutex() {
    let mut fx = Fixture::new();
    let mutex = fx.mutex_create();
    fx.semaphore_take(mutex, 0).unwrap();

    assert_eq!(fx.finish(), Err(TeardownError::MutexStillLocked { count: 1 }));
}

#[test]
#[should_panic(expected = "still locked")]
fn fixture_drop_fails_the_test_on_leaked_mutex() {
    let mut fx = Fixture::new();
    let mutex = fx.mutex_create_recursive();
    fx.mutex_take_recursive(mutex, 0).unwrap();
}

#[test]
fn fixture_drop_passes_when_locks_are_released() {
    let mut fx = Fixture::with_config(KernelConfig::builder().timers(false).build());
    let mutex = fx.mutex_create();
    fx.semaphore_take(mutex, 0).unwrap();
    fx.semaphore_give(mutex).unwrap();
    fx.task_delay(10);
    assert_eq!(fx.tick_count(), 10);
}
