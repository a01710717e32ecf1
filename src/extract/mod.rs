//! Identity extraction from the target application's preference files
//!
//! Everything here is a pure function over text that has already been fetched
//! through the privileged channel.

pub mod identity;
pub mod install;
pub mod link;

use serde::{Deserialize, Serialize};

pub use identity::{
    extract_numeric_field, extract_string_field, extract_user_id, is_channel_error_text,
    ADVERTISING_ID_FIELDS, DEVICE_TOKEN_FIELDS, USER_ID_FIELDS,
};
pub use install::{
    extract_install_id, extract_ssaid, extract_ssaid_from_any_prefs, extract_ssaid_from_prefs,
    SSAID_FIELDS,
};
pub use link::{friend_link, friend_link_user_id};

/// Raw file contents the extractors run against. Missing files are empty strings.
#[derive(Debug, Clone, Default)]
pub struct IdentitySources {
    /// Main player preferences
    pub player_prefs: String,
    /// File holding the path-embedded install id
    pub install_file: String,
    /// System-level per-install identifier file
    pub system_ssaid: String,
    /// Every other preference file, searched for the SSAID last
    pub other_prefs: Vec<String>,
}

/// Identity fields recovered for one profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub user_id: Option<String>,
    pub advertising_id: Option<String>,
    pub install_id: Option<String>,
    pub ssaid: Option<String>,
    pub device_token: Option<String>,
}

impl IdentityFields {
    /// Run every extractor against the fetched sources
    pub fn from_sources(sources: &IdentitySources, package: &str) -> Self {
        Self {
            user_id: extract_user_id(&sources.player_prefs),
            advertising_id: extract_string_field(&sources.player_prefs, ADVERTISING_ID_FIELDS),
            install_id: extract_install_id(&sources.install_file),
            ssaid: extract_ssaid(&sources.system_ssaid, package)
                .or_else(|| extract_ssaid_from_prefs(&sources.player_prefs))
                .or_else(|| {
                    extract_ssaid_from_any_prefs(sources.other_prefs.iter().map(String::as_str))
                }),
            device_token: extract_string_field(&sources.player_prefs, DEVICE_TOKEN_FIELDS),
        }
    }

    pub fn has_user_id(&self) -> bool {
        self.user_id.is_some()
    }

    /// Keep already-known values where this extraction found nothing
    pub fn merged_over(self, previous: &IdentityFields) -> Self {
        Self {
            user_id: self.user_id.or_else(|| previous.user_id.clone()),
            advertising_id: self
                .advertising_id
                .or_else(|| previous.advertising_id.clone()),
            install_id: self.install_id.or_else(|| previous.install_id.clone()),
            ssaid: self.ssaid.or_else(|| previous.ssaid.clone()),
            device_token: self.device_token.or_else(|| previous.device_token.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sources_collects_all_fields() {
        let sources = IdentitySources {
            player_prefs: r#"<map>
    <string name="Scopely.UserId">112233</string>
    <string name="gaid">38400000-8cf0-11bd-b23e-10b96e40000d</string>
    <string name="device_token">tok-1</string>
    <string name="android_id">0011223344556677</string>
</map>"#
                .into(),
            install_file: "/data/user/0/com.scopely.monopolygo/files/a1b2c3d4e5f60718".into(),
            system_ssaid: String::new(),
            other_prefs: Vec::new(),
        };
        let fields = IdentityFields::from_sources(&sources, "com.scopely.monopolygo");
        assert_eq!(fields.user_id.as_deref(), Some("112233"));
        assert_eq!(
            fields.advertising_id.as_deref(),
            Some("38400000-8cf0-11bd-b23e-10b96e40000d")
        );
        assert_eq!(fields.install_id.as_deref(), Some("a1b2c3d4e5f60718"));
        assert_eq!(fields.ssaid.as_deref(), Some("0011223344556677"));
        assert_eq!(fields.device_token.as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_ssaid_falls_back_to_other_prefs() {
        let sources = IdentitySources {
            player_prefs: r#"<map><string name="Scopely.UserId">1</string></map>"#.into(),
            other_prefs: vec![
                r#"<map><string name="window">3</string></map>"#.into(),
                r#"<map><string name="android_id">0011223344556677</string></map>"#.into(),
            ],
            ..Default::default()
        };
        let fields = IdentityFields::from_sources(&sources, "com.scopely.monopolygo");
        assert_eq!(fields.ssaid.as_deref(), Some("0011223344556677"));

        let with_system = IdentitySources {
            system_ssaid: r#"<setting id="7" value="aaaabbbbccccdddd" package="com.scopely.monopolygo" />"#
                .into(),
            ..sources
        };
        let fields = IdentityFields::from_sources(&with_system, "com.scopely.monopolygo");
        assert_eq!(fields.ssaid.as_deref(), Some("aaaabbbbccccdddd"));
    }

    #[test]
    fn test_empty_sources_are_absent_not_errors() {
        let fields = IdentityFields::from_sources(&IdentitySources::default(), "pkg");
        assert_eq!(fields, IdentityFields::default());
    }

    #[test]
    fn test_merged_over_keeps_known_values() {
        let previous = IdentityFields {
            user_id: Some("1".into()),
            ssaid: Some("ab".into()),
            ..Default::default()
        };
        let fresh = IdentityFields {
            user_id: Some("2".into()),
            ..Default::default()
        };
        let merged = fresh.merged_over(&previous);
        assert_eq!(merged.user_id.as_deref(), Some("2"));
        assert_eq!(merged.ssaid.as_deref(), Some("ab"));
    }
}
