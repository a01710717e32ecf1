//! Scripted channel for deterministic testing
//!
//! Responds to commands by substring rules instead of spawning a shell, and
//! records every session so tests can assert on the exact command stream.
//!
//! # Example
//! ```
//! use slotswap::channel::{CommandOutcome, MockChannel, PrivilegedChannel};
//!
//! # tokio_test_block_on(async {
//! let channel = MockChannel::new()
//!     .respond_to("pidof", CommandOutcome::failure(1, Vec::<String>::new()));
//! let outcome = channel.execute("pidof com.example").await.unwrap();
//! assert!(!outcome.is_success());
//! assert_eq!(channel.executed().len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::channel::error::ChannelError;
use crate::channel::filter::CommandFilter;
use crate::channel::outcome::CommandOutcome;
use crate::channel::PrivilegedChannel;

/// What the mock does when a rule matches
#[derive(Debug, Clone)]
pub enum MockResponse {
    Outcome(CommandOutcome),
    OpenFailure(String),
}

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    response: MockResponse,
}

/// Channel that answers from scripted rules
#[derive(Clone, Default)]
pub struct MockChannel {
    rules: Vec<MockRule>,
    fallback: Option<MockResponse>,
    filter: CommandFilter,
    executed: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer sessions containing `needle` with `outcome`. Earlier rules win.
    pub fn respond_to(mut self, needle: impl Into<String>, outcome: CommandOutcome) -> Self {
        self.rules.push(MockRule {
            needle: needle.into(),
            response: MockResponse::Outcome(outcome),
        });
        self
    }

    /// Fail to open sessions containing `needle`
    pub fn refuse(mut self, needle: impl Into<String>, reason: impl Into<String>) -> Self {
        self.rules.push(MockRule {
            needle: needle.into(),
            response: MockResponse::OpenFailure(reason.into()),
        });
        self
    }

    /// Fail to open every session not matched by a rule
    pub fn refusing_all(mut self, reason: impl Into<String>) -> Self {
        self.fallback = Some(MockResponse::OpenFailure(reason.into()));
        self
    }

    /// All sessions executed so far, in order
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.executed.lock().clone()
    }

    /// Every command line executed so far, flattened
    pub fn executed_commands(&self) -> Vec<String> {
        self.executed.lock().iter().flatten().cloned().collect()
    }

    /// Number of executed command lines containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.executed_commands()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait]
impl PrivilegedChannel for MockChannel {
    async fn execute_sequence(&self, commands: &[String]) -> Result<CommandOutcome, ChannelError> {
        if commands.is_empty() {
            return Err(ChannelError::EmptySequence);
        }
        self.filter.check_all(commands)?;
        self.executed.lock().push(commands.to_vec());

        let joined = commands.join("\n");
        let response = self
            .rules
            .iter()
            .find(|rule| joined.contains(&rule.needle))
            .map(|rule| rule.response.clone())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| MockResponse::Outcome(CommandOutcome::success(Vec::<String>::new())));

        match response {
            MockResponse::Outcome(outcome) => Ok(outcome),
            MockResponse::OpenFailure(reason) => Err(ChannelError::OpenFailed(reason)),
        }
    }
}
