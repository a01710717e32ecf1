//! Installation-scoped identifiers: path-embedded install id and SSAID

use std::sync::OnceLock;

use regex::Regex;

use super::identity::{extract_string_field, is_channel_error_text};

/// Preference keys that may carry the SSAID when the system file is unavailable
pub const SSAID_FIELDS: &[&str] = &["android_id", "ssaid"];

fn install_id_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"/([0-9a-f]{16,64})(?:[/"'<\s]|$)"#).ok())
        .as_ref()
}

fn setting_element_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"<setting\b[^>]*>").ok())
        .as_ref()
}

fn attribute_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"\s([\w.-]+)\s*=\s*"([^"]*)""#).ok())
        .as_ref()
}

fn attribute(element: &str, name: &str) -> Option<String> {
    attribute_pattern()?
        .captures_iter(element)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Recover the install id: the first path segment made of 16 to 64 lowercase hex
/// characters.
pub fn extract_install_id(content: &str) -> Option<String> {
    if content.trim().is_empty() || is_channel_error_text(content) {
        return None;
    }
    install_id_pattern()?
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Recover the SSAID assigned to `package` from the system `settings_ssaid.xml`
pub fn extract_ssaid(content: &str, package: &str) -> Option<String> {
    if content.trim().is_empty() || is_channel_error_text(content) {
        return None;
    }
    setting_element_pattern()?
        .find_iter(content)
        .map(|m| m.as_str())
        .filter(|element| attribute(element, "package").as_deref() == Some(package))
        .find_map(|element| attribute(element, "value"))
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Recover the SSAID from application preferences (`android_id`, then `ssaid`)
pub fn extract_ssaid_from_prefs(content: &str) -> Option<String> {
    extract_string_field(content, SSAID_FIELDS)
}

/// First SSAID found across several preference files, in the order given
pub fn extract_ssaid_from_any_prefs<'a, I>(files: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    files.into_iter().find_map(extract_ssaid_from_prefs)
}
