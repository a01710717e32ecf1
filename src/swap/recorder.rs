//! Persistence hook for completed swap operations

use thiserror::Error;

use crate::swap::report::{CaptureReport, RestoreReport};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct RecorderError(pub String);

/// Receives reports of successful captures and restores
pub trait ProfileRecorder: Send + Sync {
    /// Create or update the profile record for a fresh capture
    fn record_capture(&self, report: &CaptureReport) -> Result<(), RecorderError>;

    /// Mark the profile as last used now
    fn record_restore(&self, report: &RestoreReport) -> Result<(), RecorderError>;
}

/// Recorder that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl ProfileRecorder for NoopRecorder {
    fn record_capture(&self, _report: &CaptureReport) -> Result<(), RecorderError> {
        Ok(())
    }

    fn record_restore(&self, _report: &RestoreReport) -> Result<(), RecorderError> {
        Ok(())
    }
}
