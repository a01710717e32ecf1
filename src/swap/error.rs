use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::swap::archive::ArchiveError;
use crate::swap::layout::Namespace;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Invalid profile name '{0}': use 1-100 of [A-Za-z0-9._-]")]
    InvalidProfileName(String),

    #[error("Invalid user id '{0}': expected digits only")]
    InvalidUserId(String),

    #[error("Another swap operation holds the live slot")]
    Busy,

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Live state file not found under {0}")]
    LiveStateMissing(PathBuf),

    #[error("No stored snapshot for {namespace}/{name}")]
    SnapshotMissing { namespace: Namespace, name: String },

    #[error("Copy {from} -> {to} failed: {detail}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        detail: String,
    },

    #[error("Could not fix permissions on {path}: {detail}")]
    PermissionFix { path: PathBuf, detail: String },

    #[error("Staging directory {path}: {detail}")]
    Staging { path: PathBuf, detail: String },

    #[error("{step} failed: {detail}")]
    CommandFailed { step: &'static str, detail: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Storage I/O failed: {0}")]
    Storage(#[from] io::Error),

    #[error("Failed to record profile: {0}")]
    Recorder(String),
}

impl SwapError {
    /// The privileged session itself could not be opened
    pub fn is_channel_open_failure(&self) -> bool {
        matches!(self, SwapError::Channel(err) if err.is_open_failure())
    }
}
