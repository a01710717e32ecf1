//! State swap engine: capture and restore of the target app's live state

pub mod archive;
pub mod engine;
pub mod error;
pub mod layout;
pub mod lock;
pub mod recorder;
pub mod report;
pub mod settle;
pub mod target;

pub use archive::{ArchiveError, BackupManifest};
pub use engine::{Exclusivity, SwapEngine, SwapSession};
pub use error::SwapError;
pub use layout::{Namespace, SnapshotKind, StorageLayout, MANIFEST_FILE};
pub use lock::SlotLock;
pub use recorder::{NoopRecorder, ProfileRecorder, RecorderError};
pub use report::{
    CaptureOptions, CaptureReport, RestoreOptions, RestoreReport, TreeResult, TreeStatus,
};
pub use settle::{SettleOutcome, SettlePolicy, SettleWindow};
pub use target::{AppCommands, TargetApp, TreeKind, TreeSpec};
