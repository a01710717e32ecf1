//! Event automation: restore, launch and signal every filled team slot

mod directory;
mod driver;
mod observer;

pub use directory::{
    resolve_customer, resolve_profile, DirectoryError, ResolutionError, TeamDirectory,
};
pub use driver::{AutomationDriver, RunHandle, TeamPlan, WorkItem};
pub use observer::{
    ChannelObserver, ItemStep, RecordingObserver, RunEvent, RunObserver, RunState, RunSummary,
};
