//! Privileged command channel
//!
//! Lowest layer of the orchestrator. Every call opens a fresh elevated session,
//! writes the command lines followed by an exit directive, and collects stdout
//! and stderr into a [`CommandOutcome`].

pub mod error;
pub mod filter;
pub mod mock;
pub mod outcome;
pub mod session;

use async_trait::async_trait;

pub use error::{reports_error, ChannelError, LEGACY_ERROR_MARKER};
pub use filter::CommandFilter;
pub use mock::{MockChannel, MockResponse};
pub use outcome::CommandOutcome;
pub use session::{SessionConfig, ShellChannel};

/// Executes command lines with elevated privileges
#[async_trait]
pub trait PrivilegedChannel: Send + Sync {
    /// Run all commands in one session and return the combined outcome
    async fn execute_sequence(&self, commands: &[String]) -> Result<CommandOutcome, ChannelError>;

    /// Run a single command in its own session
    async fn execute(&self, command: &str) -> Result<CommandOutcome, ChannelError> {
        self.execute_sequence(&[command.to_string()]).await
    }

    /// Check whether sessions run as uid 0
    async fn probe_root(&self) -> Result<bool, ChannelError> {
        let outcome = self.execute("id -u").await?;
        Ok(outcome.is_success() && outcome.has_line("0"))
    }
}
