use fleetsim::fleet::Fleet;
use fleetsim::shutdown::ShutdownHandler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

mod common;
use common::{FakeBackend, assert_timing_within, fleet_config, temp_store};

const ONE_DEVICE: &str = r#"
[profiles.retail]
enabled = true
count = 1
"#;

/// Cancels `handler` after `delay`, standing in for SIGTERM.
fn cancel_after(handler: &ShutdownHandler, delay: Duration) {
    let token = handler.signals().token;
    tokio::spawn(async move {
        sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test]
async fn stop_drains_units_and_closes_store() {
    let (dir, store) = temp_store().await;
    let handler = ShutdownHandler::new();
    let backend = Arc::new(FakeBackend::new());
    let mut fleet = Fleet::new(
        fleet_config(&dir.path().join("devices.db"), ONE_DEVICE),
        store.clone(),
        backend.clone(),
        handler.signals(),
    );
    fleet.initialize().await.unwrap();

    cancel_after(&handler, Duration::from_millis(300));
    fleet.start().await;

    let started = Instant::now();
    let snapshot = fleet.stop().await;

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "idle units should exit before the grace period"
    );
    assert!(store.is_closed());
    assert_eq!(fleet.running_units(), 0);
    assert_eq!(snapshot.polls, 1);
    assert_eq!(snapshot.auth_granted, 1);
    assert_eq!(backend.authentications(), 1);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (dir, store) = temp_store().await;
    let handler = ShutdownHandler::new();
    let mut fleet = Fleet::new(
        fleet_config(&dir.path().join("devices.db"), ONE_DEVICE),
        store.clone(),
        Arc::new(FakeBackend::new()),
        handler.signals(),
    );
    fleet.initialize().await.unwrap();

    cancel_after(&handler, Duration::from_millis(100));
    fleet.start().await;

    let first = fleet.stop().await;
    let second = fleet.stop().await;
    assert_eq!(first, second);
    assert!(store.is_closed());
}

#[tokio::test]
async fn stalled_units_are_aborted_after_grace_period() {
    let (dir, store) = temp_store().await;
    let handler = ShutdownHandler::new();
    let backend = Arc::new(FakeBackend::stalled());
    let mut fleet = Fleet::new(
        fleet_config(&dir.path().join("devices.db"), ONE_DEVICE),
        store.clone(),
        backend.clone(),
        handler.signals(),
    );
    fleet.initialize().await.unwrap();

    cancel_after(&handler, Duration::from_millis(200));
    fleet.start().await;
    assert_eq!(fleet.running_units(), 1);
    assert_eq!(backend.authentications(), 1);

    let started = Instant::now();
    fleet.stop().await;

    // shutdown_grace_secs = 1 in the test config
    assert_timing_within(started.elapsed().as_millis(), 1_000, 500, "abort after grace");
    assert_eq!(fleet.running_units(), 0);
    assert!(store.is_closed());
}

#[tokio::test]
async fn stop_without_start_closes_store() {
    let (dir, store) = temp_store().await;
    let mut fleet = Fleet::new(
        fleet_config(&dir.path().join("devices.db"), ONE_DEVICE),
        store.clone(),
        Arc::new(FakeBackend::new()),
        ShutdownHandler::new().signals(),
    );

    let snapshot = fleet.stop().await;

    assert_eq!(snapshot.polls, 0);
    assert!(store.is_closed());
}
