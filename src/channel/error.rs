use thiserror::Error;

/// Marker string callers historically searched for in channel output
pub const LEGACY_ERROR_MARKER: &str = "Error";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Privileged session could not be opened: {0}")]
    OpenFailed(String),

    #[error("Command rejected by safety filter ({pattern}): {command}")]
    Rejected { command: String, pattern: String },

    #[error("Privileged session timed out after {0}ms")]
    Timeout(u64),

    #[error("No commands given")]
    EmptySequence,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Render the error the way the text-only contract reported it.
    pub fn legacy_text(&self) -> String {
        format!("{}: {}", LEGACY_ERROR_MARKER, self)
    }

    /// Whether the session itself never ran a command
    pub fn is_open_failure(&self) -> bool {
        matches!(self, ChannelError::OpenFailed(_) | ChannelError::Io(_))
    }
}

/// Check a legacy text result for the error marker.
pub fn reports_error(text: &str) -> bool {
    text.contains(LEGACY_ERROR_MARKER)
}
