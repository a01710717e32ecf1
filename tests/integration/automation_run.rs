//! Integration tests for event automation over the SQLite directory
//!
//! Profiles are captured on a fake device, recorded through the profile store
//! and then driven slot by slot.

use super::common::device::FakeDevice;
use slotswap::automation::{AutomationDriver, RecordingObserver, RunEvent, RunState};
use slotswap::data::{
    Customer, CustomerStore, Database, Event, EventStore, ProfileStore, SqliteDirectory, Team,
    TeamStore,
};
use slotswap::swap::{CaptureOptions, Namespace};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Create a test database in a temporary directory
fn create_test_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(dir.path().join("test.db")).expect("Failed to open database");
    (db, dir)
}

/// One resolvable and one unresolvable slot: the run completes and the
/// resolvable slot gets the full restore, launch and link sequence
#[tokio::test]
async fn test_run_with_one_unresolvable_slot() {
    let device = FakeDevice::new();
    let (db, _dir) = create_test_db();
    let engine = Arc::new(
        device
            .engine()
            .with_recorder(Arc::new(ProfileStore::new(db.connection()))),
    );

    device.write_live(b"alpha state");
    device.write_prefs("112233");
    engine
        .capture(Namespace::Own, "alpha", CaptureOptions::default())
        .await
        .unwrap();
    device.write_live(b"current state");

    let profiles = ProfileStore::new(db.connection());
    let alpha = profiles
        .find_by_name(Namespace::Own, "alpha")
        .unwrap()
        .expect("capture should record the profile");
    assert_eq!(alpha.identity.user_id.as_deref(), Some("112233"));
    assert!(alpha.last_played.is_none());

    let customer = CustomerStore::new(db.connection())
        .create(&Customer::new("carol").with_friend_link("https://mply.io/add-friend/445566"))
        .unwrap();
    let event = EventStore::new(db.connection())
        .create(&Event::new("Partner race"))
        .unwrap();
    TeamStore::new(db.connection())
        .create(
            &Team::new(event.id, "Team A")
                .with_customer(customer.id)
                .with_slot(1, alpha.id)
                .with_slot(2, 9_999),
        )
        .unwrap();

    let driver = AutomationDriver::new(
        engine.clone(),
        Arc::new(SqliteDirectory::new(db.connection())),
    );
    let observer = RecordingObserver::new();
    let summary = driver
        .run(event.id, &observer, CancellationToken::new())
        .await;

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 2);

    assert_eq!(device.read_live(), b"alpha state");
    assert_eq!(device.opened_links(), vec!["monopolygo://add-friend/445566"]);

    let alpha = profiles.get(alpha.id).unwrap().unwrap();
    assert!(alpha.last_played.is_some(), "restore should touch last played");

    let events = observer.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::ItemCompleted { slot: 1, user_id, .. } if user_id == "445566")));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::ItemFailed { slot: 2, .. })));
    assert!(matches!(events.last(), Some(RunEvent::RunFinished(_))));
}

/// An event without teams finishes immediately
#[tokio::test]
async fn test_run_empty_event() {
    let device = FakeDevice::new();
    let (db, _dir) = create_test_db();
    let event = EventStore::new(db.connection())
        .create(&Event::new("Quiet week"))
        .unwrap();

    let driver = Arc::new(AutomationDriver::new(
        Arc::new(device.engine()),
        Arc::new(SqliteDirectory::new(db.connection())),
    ));
    let mut handle = driver.spawn(event.id);
    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    let summary = handle.join.await.unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.completed + summary.failed + summary.skipped, 0);
    assert_eq!(events.len(), 2);
    assert!(device.opened_links().is_empty());
}
