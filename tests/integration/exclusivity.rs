//! Integration tests for the live slot lock shared by engines on one storage root

use std::sync::Arc;
use std::time::Duration;

use super::common::device::FakeDevice;
use slotswap::swap::{CaptureOptions, Exclusivity, Namespace, RestoreOptions, SwapError};

/// A second engine is turned away while the first holds the slot
#[tokio::test]
async fn test_second_engine_rejected_while_slot_held() {
    let device = FakeDevice::new();
    let first = device.engine().with_exclusivity(Exclusivity::Reject);
    let second = device.engine().with_exclusivity(Exclusivity::Reject);

    device.write_live(b"alpha");
    first
        .capture(Namespace::Own, "alpha", CaptureOptions::default())
        .await
        .unwrap();
    device.write_live(b"beta");

    let held = first.session().await.unwrap();
    assert!(device.layout.lock_path().exists());
    let err = second
        .restore(Namespace::Own, "alpha", RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::Busy));
    assert_eq!(device.read_live(), b"beta");

    drop(held);
    second
        .restore(Namespace::Own, "alpha", RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(device.read_live(), b"alpha");
}

/// A waiting engine runs once the other engine lets go of the slot
#[tokio::test]
async fn test_waiting_engine_runs_after_release() {
    let device = FakeDevice::new();
    let first = device.engine();
    let second = Arc::new(device.engine());

    device.write_live(b"alpha");
    first
        .capture(Namespace::Own, "alpha", CaptureOptions::default())
        .await
        .unwrap();
    device.write_live(b"beta");

    let held = first.session().await.unwrap();
    let waiter = {
        let second = Arc::clone(&second);
        tokio::spawn(async move {
            second
                .restore(Namespace::Own, "alpha", RestoreOptions::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished());
    assert_eq!(device.read_live(), b"beta");

    drop(held);
    tokio::time::timeout(Duration::from_secs(10), waiter)
        .await
        .expect("waiting restore never finished")
        .unwrap()
        .unwrap();
    assert_eq!(device.read_live(), b"alpha");
}
