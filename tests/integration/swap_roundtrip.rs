//! Integration tests for capture and restore against a fake device
//!
//! Every privileged command runs through a real `sh` session, so these tests
//! cover the engine's shell scripts as well as its control flow.

use super::common::device::FakeDevice;
use sha2::{Digest, Sha256};
use slotswap::swap::{
    CaptureOptions, Namespace, RestoreOptions, SnapshotKind, SwapError, TreeStatus,
};
use std::fs;
use std::path::Path;

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn primary_only() -> RestoreOptions {
    RestoreOptions {
        trees: false,
        relaunch: false,
    }
}

/// Capture then restore leaves the live file byte-identical to the capture
#[tokio::test]
async fn test_capture_then_restore_is_byte_identical() {
    let device = FakeDevice::new();
    let engine = device.engine();
    let original: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    device.write_live(&original);
    device.write_prefs("112233");

    let report = engine
        .capture(Namespace::Own, "alpha", CaptureOptions::default())
        .await
        .expect("capture should succeed");
    assert_eq!(report.digest, sha256_hex(&original));
    assert_eq!(report.size_bytes, original.len() as u64);
    assert_eq!(report.identity.user_id.as_deref(), Some("112233"));
    assert!(report.archive_path.is_none());

    device.write_live(b"someone else's state");

    let restored = engine
        .restore(Namespace::Own, "alpha", primary_only())
        .await
        .expect("restore should succeed");
    assert!(!restored.used_fallback_copy);
    assert_eq!(device.read_live(), original);
}

/// Restoring the same profile twice leaves the same result as once
#[tokio::test]
async fn test_restore_is_idempotent() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"profile-a");
    engine
        .capture(Namespace::Customer, "carol-1", CaptureOptions::default())
        .await
        .unwrap();

    device.write_live(b"profile-b");
    engine
        .restore(Namespace::Customer, "carol-1", primary_only())
        .await
        .unwrap();
    let once = device.read_live();
    engine
        .restore(Namespace::Customer, "carol-1", primary_only())
        .await
        .unwrap();

    assert_eq!(once, b"profile-a");
    assert_eq!(device.read_live(), once);
}

/// Namespaces keep same-named profiles apart
#[tokio::test]
async fn test_namespaces_are_independent() {
    let device = FakeDevice::new();
    let engine = device.engine();

    device.write_live(b"own copy");
    engine
        .capture(Namespace::Own, "main", CaptureOptions::default())
        .await
        .unwrap();
    device.write_live(b"customer copy");
    engine
        .capture(Namespace::Customer, "main", CaptureOptions::default())
        .await
        .unwrap();

    engine
        .restore(Namespace::Own, "main", primary_only())
        .await
        .unwrap();
    assert_eq!(device.read_live(), b"own copy");

    assert_eq!(engine.list_profiles(Namespace::Own).unwrap(), vec!["main"]);
    assert_eq!(
        engine.list_profiles(Namespace::Customer).unwrap(),
        vec!["main"]
    );
}

/// Restoring an unknown profile fails before the live slot is touched
#[tokio::test]
async fn test_restore_missing_snapshot_leaves_live_state() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"untouched");

    let err = engine
        .restore(Namespace::Own, "ghost", primary_only())
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::SnapshotMissing { .. }));
    assert_eq!(device.read_live(), b"untouched");
}

/// Capture without a live file reports it rather than storing an empty snapshot
#[tokio::test]
async fn test_capture_without_live_state() {
    let device = FakeDevice::new();
    let engine = device.engine();

    let err = engine
        .capture(Namespace::Own, "empty", CaptureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::LiveStateMissing(_)));
    assert!(engine.list_profiles(Namespace::Own).unwrap().is_empty());
}

/// The extended variant archives auxiliary files and puts them back on restore
#[tokio::test]
async fn test_extended_capture_restores_trees() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"extended state");
    device.write_prefs("445566");
    let cache_extra = device.data_path(Path::new("files/DiskBasedCacheDirectory/extra.bin"));
    std::fs::write(&cache_extra, b"cache").unwrap();

    let report = engine
        .capture(
            Namespace::Own,
            "full",
            CaptureOptions {
                extended: true,
                ..Default::default()
            },
        )
        .await
        .expect("extended capture should succeed");
    let archive = report.archive_path.clone().expect("archive should exist");
    assert!(archive.exists());
    assert_eq!(
        device.layout.snapshot_kind(Namespace::Own, "full"),
        Some(SnapshotKind::Extended)
    );
    let status_of = |name: &str| {
        report
            .trees
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.status.clone())
    };
    assert_eq!(status_of("playerprefs.xml"), Some(TreeStatus::Copied));
    assert_eq!(status_of("DiskBasedCacheDirectory"), Some(TreeStatus::Copied));
    assert_eq!(status_of("device-id.txt"), Some(TreeStatus::Absent));

    // Staging is cleaned after packing
    let leftovers: Vec<_> = std::fs::read_dir(device.layout.staging_root())
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());

    device.write_prefs("999999");
    std::fs::remove_file(&cache_extra).unwrap();
    device.write_live(b"other state");

    let restored = engine
        .restore(Namespace::Own, "full", RestoreOptions::default())
        .await
        .expect("extended restore should succeed");
    assert_eq!(device.read_live(), b"extended state");
    assert_eq!(std::fs::read(&cache_extra).unwrap(), b"cache");
    let prefs = std::fs::read_to_string(device.data_path(&device.target.player_prefs)).unwrap();
    assert!(prefs.contains("445566"));
    assert!(restored
        .trees
        .iter()
        .any(|t| t.name == "device-id.txt" && t.status == TreeStatus::Skipped));
}

/// Friend links go through the configured view command
#[tokio::test]
async fn test_friend_link_is_opened() {
    let device = FakeDevice::new();
    let engine = device.engine();

    engine.open_friend_link("112233").await.unwrap();
    assert!(matches!(
        engine.open_friend_link("12ab").await,
        Err(SwapError::InvalidUserId(_))
    ));
    assert_eq!(device.opened_links(), vec!["monopolygo://add-friend/112233"]);
}

fn extended() -> CaptureOptions {
    CaptureOptions {
        extended: true,
        ..Default::default()
    }
}

fn cache_listing(device: &FakeDevice) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(device.data_path(Path::new("files/DiskBasedCacheDirectory")))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Restoring a directory tree replaces it instead of merging into it
#[tokio::test]
async fn test_directory_tree_is_replaced_on_restore() {
    let device = FakeDevice::new();
    let engine = device.engine();
    let cache = device.data_path(Path::new("files/DiskBasedCacheDirectory"));
    device.write_live(b"alpha state");
    fs::write(cache.join("a_only.bin"), b"alpha cache").unwrap();
    engine
        .capture(Namespace::Own, "alpha", extended())
        .await
        .unwrap();

    fs::remove_file(cache.join("a_only.bin")).unwrap();
    fs::write(cache.join("b_session.bin"), b"beta cache").unwrap();
    device.write_live(b"beta state");

    engine
        .restore(Namespace::Own, "alpha", RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(
        cache_listing(&device),
        vec![
            "WithBuddies.Services.User.0Production.dat".to_string(),
            "a_only.bin".to_string()
        ]
    );
    assert_eq!(device.read_live(), b"alpha state");
    assert_eq!(fs::read(cache.join("a_only.bin")).unwrap(), b"alpha cache");
}

/// A failed extended re-capture leaves the previous snapshot and archive in place
#[tokio::test]
async fn test_failed_recapture_keeps_previous_snapshot() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"first capture");
    let first = engine
        .capture(Namespace::Own, "alpha", extended())
        .await
        .unwrap();
    let archive = first.archive_path.clone().unwrap();
    let archive_bytes = fs::read(&archive).unwrap();

    // Staging can no longer be created
    let staging = device.layout.staging_root().to_path_buf();
    fs::remove_dir_all(&staging).unwrap();
    fs::write(&staging, b"not a directory").unwrap();
    device.write_live(b"second capture");

    let err = engine
        .capture(Namespace::Own, "alpha", extended())
        .await
        .unwrap_err();
    assert!(matches!(err, SwapError::Staging { .. }));
    assert_eq!(fs::read(&first.snapshot_path).unwrap(), b"first capture");
    assert_eq!(fs::read(&archive).unwrap(), archive_bytes);
    let stray: Vec<_> = fs::read_dir(first.snapshot_path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".pending"))
        .collect();
    assert!(stray.is_empty(), "left behind: {stray:?}");

    fs::remove_file(&staging).unwrap();
    fs::create_dir_all(&staging).unwrap();
    engine
        .restore(Namespace::Own, "alpha", RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(device.read_live(), b"first capture");
}

/// A simple re-capture drops the archive of an earlier extended capture
#[tokio::test]
async fn test_simple_recapture_removes_stale_archive() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"v1");
    let first = engine
        .capture(Namespace::Own, "alpha", extended())
        .await
        .unwrap();
    device.write_live(b"v2");
    engine
        .capture(Namespace::Own, "alpha", CaptureOptions::default())
        .await
        .unwrap();

    assert!(!first.archive_path.unwrap().exists());
    assert_eq!(
        device.layout.snapshot_kind(Namespace::Own, "alpha"),
        Some(SnapshotKind::Simple)
    );
    device.write_live(b"v3");
    engine
        .restore(Namespace::Own, "alpha", RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(device.read_live(), b"v2");
}

/// The capture is kept and reported when the app cannot be started again
#[tokio::test]
async fn test_relaunch_failure_after_capture_is_a_warning() {
    let mut device = FakeDevice::new();
    device.target.commands.launch = "echo 'no launcher' >&2; false".into();
    let engine = device.engine();
    device.write_live(b"kept");

    let report = engine
        .capture(
            Namespace::Own,
            "alpha",
            CaptureOptions {
                relaunch: true,
                ..Default::default()
            },
        )
        .await
        .expect("capture should succeed without a relaunch");
    assert!(report.launch_settle.is_none());
    assert!(report.relaunch_error.unwrap().contains("no launcher"));
    assert_eq!(fs::read(&report.snapshot_path).unwrap(), b"kept");
}

/// The SSAID is found in another preference file when the system file is absent
#[tokio::test]
async fn test_ssaid_read_from_other_prefs() {
    let device = FakeDevice::new();
    let engine = device.engine();
    device.write_live(b"state");
    device.write_prefs("112233");
    fs::write(
        device.data_path(Path::new("shared_prefs/mys_mod_feature_settings.xml")),
        "<map>\n    <string name=\"android_id\">0a1b2c3d4e5f6071</string>\n</map>\n",
    )
    .unwrap();

    let identity = engine.read_identity().await.unwrap();
    assert_eq!(identity.user_id.as_deref(), Some("112233"));
    assert_eq!(identity.ssaid.as_deref(), Some("0a1b2c3d4e5f6071"));
}
