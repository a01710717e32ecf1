//! Friend-link helpers

use regex::Regex;

/// Deep-link path segment that precedes the user id
pub const ADD_FRIEND_PATH: &str = "add-friend";

/// Build `<scheme>://add-friend/<user_id>`
pub fn friend_link(scheme: &str, user_id: &str) -> String {
    format!("{}://{}/{}", scheme, ADD_FRIEND_PATH, user_id)
}

/// Recover the user id from a friend link, deep link or shared web link
pub fn friend_link_user_id(link: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{}/(\d+)", regex::escape(ADD_FRIEND_PATH))).ok()?;
    re.captures(link.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friend_link_format() {
        assert_eq!(
            friend_link("monopolygo", "112233"),
            "monopolygo://add-friend/112233"
        );
    }

    #[test]
    fn test_user_id_from_links() {
        assert_eq!(
            friend_link_user_id("monopolygo://add-friend/112233"),
            Some("112233".to_string())
        );
        assert_eq!(
            friend_link_user_id("https://mply.io/add-friend/998877?ref=share"),
            Some("998877".to_string())
        );
        assert_eq!(friend_link_user_id("https://mply.io/abcdef"), None);
    }
}
