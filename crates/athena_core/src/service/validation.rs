//! Account field validation shared by registration and profile edits.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const MIN_USERNAME_CHARS: usize = 3;
pub(crate) const MIN_PASSWORD_CHARS: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Returns the trimmed username when it is long enough.
pub(crate) fn normalize_username(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (trimmed.chars().count() >= MIN_USERNAME_CHARS).then(|| trimmed.to_string())
}

/// Returns the trimmed email when it has a `local@domain.tld` shape.
pub(crate) fn normalize_email(value: &str) -> Option<String> {
    let trimmed = value.trim();
    EMAIL_RE.is_match(trimmed).then(|| trimmed.to_string())
}

pub(crate) fn is_acceptable_password(value: &str) -> bool {
    value.chars().count() >= MIN_PASSWORD_CHARS
}
