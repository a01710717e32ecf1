//! Static denylist applied to every command before a session is opened.
//!
//! This is an advisory check. Callers build commands from internal constants and
//! quoted path segments; the filter only catches obviously destructive strings.

use std::sync::OnceLock;

use regex::Regex;

use crate::channel::error::ChannelError;

const DENYLIST: &[(&str, &str)] = &[
    (
        "recursive-delete-root",
        r#"\brm\s+(?:--?[\w-]+\s+)*(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\s+(?:--?[\w-]+\s+)*['"]?/+\*?['"]?(?:\s|$|;|&|\|)"#,
    ),
    (
        "block-device-write",
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|block/|mmcblk|nvme)",
    ),
    ("mkfs", r"\bmkfs(?:\.\w+)?\b"),
    ("dd-to-device", r"\bdd\s+[^;&|]*\bof=/dev/"),
    (
        "process-substitution-fetch",
        r"<\(\s*(?:curl|wget)\b",
    ),
    (
        "pipe-fetch-to-shell",
        r"\b(?:curl|wget)\b[^;&]*\|\s*(?:ba|z|da)?sh\b",
    ),
];

fn compiled() -> &'static [(&'static str, Regex)] {
    static CELL: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        DENYLIST
            .iter()
            .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (*name, re)))
            .collect()
    })
}

/// Denylist filter for privileged commands
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFilter;

impl CommandFilter {
    pub fn new() -> Self {
        Self
    }

    /// Return the name of the first denylist rule the command matches
    pub fn matched_rule(&self, command: &str) -> Option<&'static str> {
        if command.trim().is_empty() {
            return Some("empty-command");
        }
        compiled()
            .iter()
            .find(|(_, re)| re.is_match(command))
            .map(|(name, _)| *name)
    }

    pub fn check(&self, command: &str) -> Result<(), ChannelError> {
        match self.matched_rule(command) {
            Some(pattern) => {
                tracing::error!(command = %command, rule = pattern, "Command validation failed");
                Err(ChannelError::Rejected {
                    command: command.to_string(),
                    pattern: pattern.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    pub fn check_all<S: AsRef<str>>(&self, commands: &[S]) -> Result<(), ChannelError> {
        commands.iter().try_for_each(|c| self.check(c.as_ref()))
    }
}
