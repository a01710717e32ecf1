//! Shell quoting and profile-name validation
//!
//! Every command the engine sends through the privileged channel is built from
//! internal constants plus path segments passed through these helpers.

use std::path::Path;

/// Longest profile name accepted as a path segment
pub const MAX_PROFILE_NAME_LEN: usize = 100;

/// Quote an argument for a POSIX shell.
///
/// Wraps the value in single quotes and rewrites embedded single quotes as `'\''`.
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quote a path for a POSIX shell
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Check that a profile name is safe to use as a single path segment.
///
/// Only ASCII letters, digits, `.`, `_` and `-` are accepted, and the name may
/// not be `.` or `..`.
pub fn is_valid_profile_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_PROFILE_NAME_LEN {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Check that a value is a plain run of ASCII digits
pub fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("/data/data/app"), "'/data/data/app'");
    }

    #[test]
    fn test_quote_embedded_single_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_profile_name_validation() {
        assert!(is_valid_profile_name("main_01"));
        assert!(is_valid_profile_name("alt.account-2"));
        assert!(!is_valid_profile_name(""));
        assert!(!is_valid_profile_name(".."));
        assert!(!is_valid_profile_name("a/b"));
        assert!(!is_valid_profile_name("x; rm -rf ~"));
        assert!(!is_valid_profile_name(&"a".repeat(101)));
    }

    #[test]
    fn test_numeric_id() {
        assert!(is_numeric_id("0012345"));
        assert!(!is_numeric_id(""));
        assert!(!is_numeric_id("12a"));
    }
}
