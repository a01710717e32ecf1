//! Structured result of one privileged session

use serde::{Deserialize, Serialize};

/// Exit code a POSIX shell reports for an unknown command
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Result of running one or more commands in a single privileged session.
///
/// The exit status belongs to the last command before the `exit` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Exit code of the session, `None` if it was terminated by a signal
    pub exit_code: Option<i32>,
    /// Lines written to stdout, without trailing newlines
    pub stdout: Vec<String>,
    /// Lines written to stderr, without trailing newlines
    pub stderr: Vec<String>,
}

impl CommandOutcome {
    pub fn new(exit_code: Option<i32>, stdout: Vec<String>, stderr: Vec<String>) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
        }
    }

    /// Successful outcome with the given stdout lines
    pub fn success<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(0), lines.into_iter().map(Into::into).collect(), vec![])
    }

    /// Failed outcome with an exit code and stderr lines
    pub fn failure<I, S>(exit_code: i32, stderr: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Some(exit_code),
            vec![],
            stderr.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The shell could not find the command that ran last
    pub fn is_command_missing(&self) -> bool {
        self.exit_code == Some(EXIT_COMMAND_NOT_FOUND)
    }

    /// Stdout joined with newlines
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Stderr joined with newlines
    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }

    /// Whether any stdout line, trimmed, equals `token`
    pub fn has_line(&self, token: &str) -> bool {
        self.stdout.iter().any(|line| line.trim() == token)
    }

    /// Merged text view: stdout lines, then stderr lines prefixed with `ERROR: `.
    pub fn legacy_text(&self) -> String {
        let mut text = String::new();
        for line in &self.stdout {
            text.push_str(line);
            text.push('\n');
        }
        for line in &self.stderr {
            text.push_str("ERROR: ");
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_text_prefixes_stderr() {
        let outcome = CommandOutcome::new(
            Some(1),
            vec!["copied".into()],
            vec!["cp: cannot stat".into()],
        );
        assert_eq!(outcome.legacy_text(), "copied\nERROR: cp: cannot stat\n");
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_has_line_trims() {
        let outcome = CommandOutcome::success(["  exists  ", "other"]);
        assert!(outcome.has_line("exists"));
        assert!(!outcome.has_line("missing"));
    }
}
