//! User identifier and string-field extraction from preference XML

use std::sync::OnceLock;

use regex::Regex;

use crate::channel::LEGACY_ERROR_MARKER;

/// Field names that may hold the numeric user id, most specific first.
///
/// The order is part of the on-disk compatibility contract and must not change.
pub const USER_ID_FIELDS: &[&str] = &[
    "Scopely.UserId",
    "Scopely.Attribution.UserId",
    "ScopelyProfile.UserId",
    "WithBuddies.UserId",
    "PlayerId",
    "player_id",
    "UserId",
    "userId",
    "user_id",
];

/// Field names for the advertising id, most specific first
pub const ADVERTISING_ID_FIELDS: &[&str] = &["gaid", "advertising_id", "adid"];

/// Field names for the short-lived device token, most specific first
pub const DEVICE_TOKEN_FIELDS: &[&str] = &["device_token", "DeviceToken", "fcm_token"];

/// Whether the content is an error rendered by the channel instead of file data
pub fn is_channel_error_text(content: &str) -> bool {
    content
        .trim_start()
        .starts_with(&format!("{}:", LEGACY_ERROR_MARKER))
}

fn unusable(content: &str) -> bool {
    content.trim().is_empty() || is_channel_error_text(content)
}

fn digit_string_shape() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r#"<string\s+name\s*=\s*"([^"]*)"\s*>\s*(\d+)\s*</string>"#).ok()
    })
    .as_ref()
}

fn digit_attribute_shape() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r#"<(?:int|long)\s+name\s*=\s*"([^"]*)"\s+value\s*=\s*"(\d+)"\s*/>"#).ok()
    })
    .as_ref()
}

fn text_element_shape() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r#"<string\s+name\s*=\s*"([^"]*)"\s*>([^<]+)</string>"#).ok())
        .as_ref()
}

fn text_attribute_shape() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r#"<long\s+name\s*=\s*"([^"]*)"\s+value\s*=\s*"([^"]+)""#).ok()
    })
    .as_ref()
}

/// Value of the first element of `shape` whose name is exactly `key`
fn value_for(shape: Option<&Regex>, content: &str, key: &str) -> Option<String> {
    shape?
        .captures_iter(content)
        .find(|caps| caps.get(1).is_some_and(|name| name.as_str() == key))
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Recover a numeric identifier using an explicit field-name priority list.
///
/// For each name the string element shape is tried before the attribute shape;
/// the next name is only considered once both fail for the current one.
pub fn extract_numeric_field(content: &str, names: &[&str]) -> Option<String> {
    if unusable(content) {
        return None;
    }
    names.iter().find_map(|key| {
        value_for(digit_string_shape(), content, key)
            .or_else(|| value_for(digit_attribute_shape(), content, key))
    })
}

/// Recover the numeric user id from preference content
pub fn extract_user_id(content: &str) -> Option<String> {
    extract_numeric_field(content, USER_ID_FIELDS)
}

/// Recover a free-form string value (`<string>` element or `<long>` attribute)
pub fn extract_string_field(content: &str, names: &[&str]) -> Option<String> {
    if unusable(content) {
        return None;
    }
    names.iter().find_map(|key| {
        value_for(text_element_shape(), content, key)
            .or_else(|| value_for(text_attribute_shape(), content, key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
