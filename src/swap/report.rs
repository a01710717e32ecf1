//! Options and results of swap operations

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::extract::IdentityFields;
use crate::swap::layout::Namespace;
use crate::swap::settle::SettleOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Also archive the auxiliary trees
    pub extended: bool,
    /// Include trees marked opt-in (login tokens)
    pub include_opt_in: bool,
    /// Launch the app again afterwards
    pub relaunch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Restore auxiliary trees when an archive is stored
    pub trees: bool,
    pub relaunch: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            trees: true,
            relaunch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum TreeStatus {
    Copied,
    /// Not present on the device
    Absent,
    /// Not restorable by configuration
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeResult {
    pub name: String,
    #[serde(flatten)]
    pub status: TreeStatus,
}

impl TreeResult {
    pub fn new(name: impl Into<String>, status: TreeStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub namespace: Namespace,
    pub name: String,
    /// Live path the primary file was copied from
    pub source: PathBuf,
    pub snapshot_path: PathBuf,
    /// Hex SHA-256 of the captured primary file
    pub digest: String,
    pub size_bytes: u64,
    pub archive_path: Option<PathBuf>,
    pub trees: Vec<TreeResult>,
    pub identity: IdentityFields,
    pub stop_settle: SettleOutcome,
    pub launch_settle: Option<SettleOutcome>,
    /// The snapshot is stored but the app could not be started again
    pub relaunch_error: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub namespace: Namespace,
    pub name: String,
    pub snapshot_path: PathBuf,
    /// The redirect copy failed verification and `cp` was used
    pub used_fallback_copy: bool,
    pub trees: Vec<TreeResult>,
    pub stop_settle: SettleOutcome,
    pub launch_settle: Option<SettleOutcome>,
    pub restored_at: DateTime<Utc>,
}
