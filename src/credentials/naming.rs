use crate::models::Account;
use once_cell::sync::Lazy;
use regex::Regex;

static MATCH_FIRST_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("(.)([A-Z][a-z]+)").expect("valid regex"));
static MATCH_ALL_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z0-9])([A-Z])").expect("valid regex"));

/// Split a mixed-case token into hyphen-separated words, keeping case.
///
/// `DevSSOLogin` becomes `Dev-SSO-Login`.
pub fn snake(text: &str) -> String {
    let first = MATCH_FIRST_CAP.replace_all(text, "${1}-${2}");
    MATCH_ALL_CAP.replace_all(&first, "${1}-${2}").into_owned()
}

/// Local profile name for the role at `role_index` of an account.
///
/// The first role keeps the bare account name; later roles get the
/// hyphenated role name appended.
pub fn resolve_profile_name(account: &Account, role_index: usize, role_name: &str) -> String {
    let mut profile = account.name.replace(' ', "-");
    if role_index > 0 {
        profile = format!("{}-{}", profile, snake(role_name));
    }
    profile.to_lowercase()
}
