//! End-to-end attendance scenarios driven through the monitor with fake
//! platform, ledger, and notifier.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;

use common::{FailingStore, FakeLedger, FakePlatform, Harness};
use geoproof::storage::keys;
use geoproof::{
    ArmRequest, Clock, Direction, GeofenceMonitor, GeoproofError, KeyValueStore, PermissionError,
    PermissionStatus, RawSignal, SignalKind, TransitionOutcome,
};

fn arm_e1(h: &Harness) -> ArmRequest {
    ArmRequest::new("E1", 52.52, 13.405, 100.0).ends_at(h.clock.now() + Duration::hours(2))
}

#[tokio::test]
async fn normal_check_in_delivers_via_procedure() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    assert!(monitor.status().await.started);
    let regions = h.platform.registered(geoproof::DEFAULT_TASK_NAME);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].identifier, "event:E1");

    let outcome = monitor.on_transition(RawSignal::enter("event:E1").with_accuracy(12.0)).await;
    assert!(matches!(outcome, TransitionOutcome::Delivered { .. }));

    let rows = h.ledger.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_id, "E1");
    assert_eq!(rows[0].dir, Direction::Enter);
    assert_eq!(rows[0].region_id.as_deref(), Some("event:E1"));
    assert_eq!(rows[0].accuracy_meters, Some(12.0));
    assert_eq!(rows[0].device, "test-device");
    assert_eq!(h.ledger.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(monitor.pending_count().await, 0);
    assert_eq!(h.notifier.titles(), vec!["Checked in".to_string()]);
}

#[tokio::test]
async fn offline_entry_is_queued_then_flushed_on_reconnect() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    h.ledger.set_online(false);
    let outcome = monitor.on_transition(RawSignal::enter("event:E1")).await;
    let idem = match outcome {
        TransitionOutcome::Queued { idem, flush } => {
            assert!(flush.halted);
            assert_eq!(flush.remaining, 1);
            idem
        }
        other => panic!("expected queued, got {other:?}"),
    };
    assert_eq!(monitor.pending_count().await, 1);
    assert!(h.ledger.rows().is_empty());

    h.ledger.set_online(true);
    let report = monitor.flush_pending().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(monitor.pending_count().await, 0);
    assert_eq!(h.ledger.rows()[0].idem, idem);
}

#[tokio::test]
async fn arm_flushes_backlog_from_previous_session() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    h.ledger.set_online(false);
    monitor.on_transition(RawSignal::enter("event:E1")).await;
    h.clock.advance(Duration::minutes(5));
    monitor.on_transition(RawSignal::exit("event:E1")).await;
    assert_eq!(monitor.pending_count().await, 2);
    monitor.disarm().await;

    h.ledger.set_online(true);
    monitor
        .arm(ArmRequest::new("E2", 48.85, 2.35, 200.0))
        .await
        .unwrap();

    assert_eq!(monitor.pending_count().await, 0);
    let dirs: Vec<Direction> = h.ledger.rows().iter().map(|r| r.dir).collect();
    assert_eq!(dirs, vec![Direction::Enter, Direction::Exit]);
}

#[tokio::test]
async fn expired_window_clears_context_and_stops_monitoring() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor
        .arm(ArmRequest::new("E1", 52.52, 13.405, 100.0).ends_at(h.clock.now() - Duration::seconds(1)))
        .await
        .unwrap();
    assert!(monitor.active_event().is_some());

    assert_eq!(monitor.active_event_id().await, None);
    assert!(h.store.get(keys::ACTIVE_EVENT_META).unwrap().is_none());
    assert!(!monitor.status().await.started);
}

#[tokio::test]
async fn signal_after_window_expired_is_ignored() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    h.clock.advance(Duration::hours(3));
    let outcome = monitor.on_transition(RawSignal::exit("event:E1")).await;

    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);
    assert!(h.ledger.rows().is_empty());
    assert_eq!(monitor.pending_count().await, 0);
    assert!(monitor.active_event().is_none());
    assert!(!monitor.status().await.started);
}

#[tokio::test]
async fn lost_context_falls_back_to_registered_region_name() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    // Context wiped while the host still tracks the region.
    h.store.delete(keys::ACTIVE_EVENT_META).unwrap();
    let outcome = monitor.on_transition(RawSignal::enter("event:E1")).await;

    assert!(matches!(outcome, TransitionOutcome::Delivered { .. }));
    assert_eq!(h.ledger.rows()[0].event_id, "E1");
}

#[tokio::test]
async fn no_event_means_no_record() {
    let h = Harness::new();
    let monitor = h.monitor();

    let outcome = monitor.on_transition(RawSignal::enter("home")).await;
    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);

    let outcome = monitor.on_transition(RawSignal::new(SignalKind::Exit, None)).await;
    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);

    assert_eq!(monitor.pending_count().await, 0);
    assert!(h.ledger.rows().is_empty());
    assert_eq!(h.ledger.procedure_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stray_signal_after_disarm_is_ignored() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();
    monitor.disarm().await;

    assert!(!monitor.status().await.started);
    assert!(monitor.active_event().is_none());

    let outcome = monitor.on_transition(RawSignal::enter("custom-region")).await;
    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);
    assert!(h.ledger.rows().is_empty());
}

#[tokio::test]
async fn late_callback_from_disarmed_region_is_ignored() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();
    monitor.disarm().await;

    let outcome = monitor.on_transition(RawSignal::enter("event:E1")).await;
    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);
    assert!(h.ledger.rows().is_empty());
    assert_eq!(monitor.pending_count().await, 0);
    assert_eq!(h.ledger.procedure_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disarm_clears_context_even_when_platform_fails() {
    let h = Harness::new();
    let monitor = h.monitor();

    // Nothing registered, so the platform reports an unregistration error.
    h.store.set(keys::LEGACY_ACTIVE_EVENT_ID, "E0").unwrap();
    monitor.disarm().await;

    assert!(monitor.active_event().is_none());
    assert!(h.store.get(keys::LEGACY_ACTIVE_EVENT_ID).unwrap().is_none());
}

#[tokio::test]
async fn repeated_enter_inside_window_produces_one_record() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    monitor.on_transition(RawSignal::enter("event:E1")).await;
    h.clock.advance(Duration::seconds(10));
    let second = monitor.on_transition(RawSignal::enter("event:E1")).await;

    assert_eq!(second, TransitionOutcome::Debounced);
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn enter_then_exit_inside_window_produces_two_records() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    monitor.on_transition(RawSignal::enter("event:E1")).await;
    h.clock.advance(Duration::seconds(10));
    monitor.on_transition(RawSignal::exit("event:E1")).await;

    let rows = h.ledger.rows();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].idem, rows[1].idem);
}

#[tokio::test]
async fn unrecognised_signal_counts_as_enter() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    monitor
        .on_transition(RawSignal::new(SignalKind::from_code(9), Some("event:E1".to_string())))
        .await;
    assert_eq!(h.ledger.rows()[0].dir, Direction::Enter);
}

#[tokio::test]
async fn error_signal_only_notifies() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    let outcome = monitor.on_transition(RawSignal::failed("kCLErrorRegionMonitoringFailure")).await;
    assert!(matches!(outcome, TransitionOutcome::PlatformError { .. }));
    assert!(h.ledger.rows().is_empty());
    assert!(h.store.get(keys::LAST_TRANSITION).unwrap().is_none());
    assert_eq!(h.notifier.titles(), vec!["Geofence error".to_string()]);
}

#[tokio::test]
async fn unavailable_notifier_is_skipped() {
    let h = Harness::new();
    h.notifier.available.store(false, Ordering::SeqCst);
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    monitor.on_transition(RawSignal::enter("event:E1")).await;
    assert_eq!(h.ledger.rows().len(), 1);
    assert!(h.notifier.titles().is_empty());
}

#[tokio::test]
async fn missing_procedure_falls_back_to_raw_insert() {
    let h = Harness::new();
    h.ledger.procedure_deployed.store(false, Ordering::SeqCst);
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();

    let outcome = monitor.on_transition(RawSignal::enter("event:E1")).await;
    assert!(matches!(outcome, TransitionOutcome::Delivered { .. }));
    assert_eq!(h.ledger.insert_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn denied_foreground_permission_leaves_no_state() {
    let h = Harness::new();
    *h.platform.foreground.lock().unwrap() = PermissionStatus::Denied;
    let monitor = h.monitor();

    let err = monitor.arm(arm_e1(&h)).await.unwrap_err();
    assert!(matches!(err, GeoproofError::Permission(PermissionError::ForegroundDenied)));
    assert!(err.is_permission());
    assert!(!monitor.status().await.started);
    assert!(monitor.active_event().is_none());
}

#[tokio::test]
async fn denied_background_permission_leaves_no_state() {
    let h = Harness::new();
    *h.platform.background.lock().unwrap() = Some(PermissionStatus::Undetermined);
    let monitor = h.monitor();

    let err = monitor.arm(arm_e1(&h)).await.unwrap_err();
    assert!(matches!(err, GeoproofError::Permission(PermissionError::BackgroundDenied)));
    assert!(h.platform.registered(geoproof::DEFAULT_TASK_NAME).is_empty());
    assert!(monitor.active_event().is_none());
}

#[tokio::test]
async fn platform_without_background_tier_can_arm() {
    let h = Harness::new();
    *h.platform.background.lock().unwrap() = None;
    let monitor = h.monitor();

    monitor.arm(arm_e1(&h)).await.unwrap();
    assert!(monitor.status().await.started);
}

#[tokio::test]
async fn registration_failure_persists_nothing() {
    let h = Harness::new();
    h.platform.fail_start.store(true, Ordering::SeqCst);
    let monitor = h.monitor();

    let err = monitor.arm(arm_e1(&h)).await.unwrap_err();
    assert!(err.is_platform());
    assert!(monitor.active_event().is_none());
}

#[tokio::test]
async fn invalid_request_is_rejected_before_platform_calls() {
    let h = Harness::new();
    let monitor = h.monitor();

    let err = monitor.arm(ArmRequest::new("E1", 0.0, 0.0, -5.0)).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.platform.stop_calls.load(Ordering::SeqCst), 0);
    assert!(!monitor.status().await.started);
}

#[tokio::test]
async fn rearm_keeps_exactly_one_region() {
    let h = Harness::new();
    let monitor = h.monitor();
    monitor.arm(arm_e1(&h)).await.unwrap();
    monitor.arm(ArmRequest::new("E2", 48.85, 2.35, 200.0)).await.unwrap();

    let regions = h.platform.registered(geoproof::DEFAULT_TASK_NAME);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].identifier, "event:E2");
    assert_eq!(monitor.active_event_id().await.as_deref(), Some("E2"));
}

#[tokio::test]
async fn handler_survives_a_store_that_always_fails() {
    let store = Arc::new(FailingStore::default());
    let platform = Arc::new(FakePlatform::default());
    let ledger = Arc::new(FakeLedger::default());
    let monitor = GeofenceMonitor::builder(store.clone(), platform.clone(), ledger.clone())
        .build()
        .unwrap();

    // Registration succeeds; persisting the context silently fails.
    monitor.arm(ArmRequest::new("E1", 52.52, 13.405, 100.0)).await.unwrap();
    assert!(monitor.active_event().is_none());

    // The live region name still attributes the signal.
    let outcome = monitor.on_transition(RawSignal::enter("event:E1")).await;
    assert!(matches!(outcome, TransitionOutcome::Delivered { .. }));
    assert_eq!(ledger.rows()[0].event_id, "E1");

    // Offline: the enqueue cannot persist, but nothing panics.
    ledger.set_online(false);
    let outcome = monitor.on_transition(RawSignal::exit("event:E1")).await;
    assert!(matches!(outcome, TransitionOutcome::Queued { .. }));
    assert_eq!(monitor.pending_count().await, 0);

    // Unattributable signals are still no-ops.
    let outcome = monitor.on_transition(RawSignal::enter("home")).await;
    assert_eq!(outcome, TransitionOutcome::NoActiveEvent);

    monitor.disarm().await;
    assert!(store.attempts.load(Ordering::SeqCst) > 0);
}
