//! Elevated shell sessions backed by a spawned `su` (or compatible) process

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::channel::error::ChannelError;
use crate::channel::filter::CommandFilter;
use crate::channel::outcome::CommandOutcome;
use crate::channel::PrivilegedChannel;

/// Directive written after the last command so the session closes
pub const EXIT_DIRECTIVE: &str = "exit";

/// Default upper bound for one session
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for starting elevated sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Program that opens the elevated shell (e.g. `su`)
    pub program: PathBuf,
    /// Extra arguments passed to the program
    pub args: Vec<String>,
    /// Upper bound for one session, including all commands
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let program = which::which("su").unwrap_or_else(|_| PathBuf::from("su"));
        Self::new(program)
    }
}

/// Channel that opens a fresh shell process per call and feeds it commands on stdin
pub struct ShellChannel {
    config: SessionConfig,
    filter: CommandFilter,
}

impl ShellChannel {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            filter: CommandFilter::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run_session(&self, commands: &[String]) -> Result<CommandOutcome, ChannelError> {
        let mut child = self.build_command().spawn().map_err(|e| {
            ChannelError::OpenFailed(format!("{}: {}", self.config.program.display(), e))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::OpenFailed("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::OpenFailed("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ChannelError::OpenFailed("stderr not captured".into()))?;

        let stdout_task = tokio::spawn(collect_lines(BufReader::new(stdout)));
        let stderr_task = tokio::spawn(collect_lines(BufReader::new(stderr)));

        let mut script = String::new();
        for command in commands {
            script.push_str(command);
            script.push('\n');
        }
        script.push_str(EXIT_DIRECTIVE);
        script.push('\n');

        // A shell that refuses elevation exits before reading stdin.
        if let Err(e) = stdin.write_all(script.as_bytes()).await {
            let _ = child.kill().await;
            return Err(ChannelError::OpenFailed(format!(
                "session closed before commands were written: {}",
                e
            )));
        }
        drop(stdin);

        let status = child.wait().await?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CommandOutcome::new(status.code(), stdout, stderr))
    }
}

impl Default for ShellChannel {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

async fn collect_lines<R: AsyncBufRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = reader.lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push(line);
    }
    collected
}

#[async_trait]
impl PrivilegedChannel for ShellChannel {
    async fn execute_sequence(&self, commands: &[String]) -> Result<CommandOutcome, ChannelError> {
        if commands.is_empty() {
            return Err(ChannelError::EmptySequence);
        }
        self.filter.check_all(commands)?;

        tracing::debug!(
            program = %self.config.program.display(),
            commands = ?commands,
            "Executing privileged commands"
        );

        let timeout_ms = self.config.timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(self.config.timeout, self.run_session(commands))
            .await
            .map_err(|_| ChannelError::Timeout(timeout_ms))??;

        if !outcome.stderr.is_empty() {
            tracing::warn!(stderr = %outcome.stderr_text(), "Command stderr");
        }
        if !outcome.is_success() {
            tracing::error!(code = ?outcome.exit_code, "Command failed");
        }
        tracing::debug!(output = %outcome.stdout_text().trim(), "Command output");

        Ok(outcome)
    }
}
