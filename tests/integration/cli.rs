//! Integration tests for the `slotswap` binary
//!
//! Only commands that stay off the device are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn slotswap(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("slotswap").expect("binary should build");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

#[test]
fn test_first_run_writes_config_and_lists_nothing() {
    let dir = TempDir::new().unwrap();
    slotswap(&dir)
        .args(["list", "--namespace", "customer"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("slotswap.db").exists());
}

#[test]
fn test_customer_event_team_setup() {
    let dir = TempDir::new().unwrap();
    slotswap(&dir)
        .args([
            "customer",
            "add",
            "carol",
            "--link",
            "https://mply.io/add-friend/445566",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added customer carol (id 1)"));

    slotswap(&dir)
        .args(["customer", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("445566"));

    slotswap(&dir)
        .args(["event", "add", "Race", "--starts", "2026-10-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added event Race (id 1)"));

    slotswap(&dir)
        .args(["team", "add", "1", "Team A", "--customer", "1"])
        .assert()
        .success();

    slotswap(&dir)
        .args(["team", "assign", "1", "1", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No profile 'nobody'"));

    slotswap(&dir)
        .args(["activity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("team-add"))
        .stdout(predicate::str::contains("customer-add"));
}

#[test]
fn test_event_with_end_before_start_is_rejected() {
    let dir = TempDir::new().unwrap();
    slotswap(&dir)
        .args([
            "event",
            "add",
            "Backwards",
            "--starts",
            "2026-10-10",
            "--ends",
            "2026-10-01",
        ])
        .assert()
        .failure();
}

#[test]
fn test_invalid_namespace_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    slotswap(&dir)
        .args(["restore", "alpha", "--namespace", "friends"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown namespace"));
}

#[test]
fn test_set_storage_root_persists_to_config() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("elsewhere");
    slotswap(&dir)
        .args(["config", "set-storage-root"])
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage root set to"));

    let config = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(config.contains(&root.to_string_lossy().to_string()));

    slotswap(&dir)
        .args(["activity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage root set to"));
}

#[test]
fn test_profile_commands_need_a_stored_profile() {
    let dir = TempDir::new().unwrap();
    for args in [
        vec!["profile", "show", "ghost"],
        vec!["profile", "error", "ghost"],
        vec!["profile", "note", "ghost", "banned on main"],
    ] {
        slotswap(&dir)
            .args(&args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No profile 'ghost'"));
    }
}
