use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static SESSION_ID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""session_id"\s*:\s*"([A-Za-z0-9][A-Za-z0-9._-]*)""#)
        .expect("session id pattern compiles")
});

#[allow(clippy::expect_used)]
static BARE_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("uuid pattern compiles")
});

/// Find a conversation resume id in `text`.
///
/// A `"session_id": "<value>"` field wins over a bare UUID-shaped token; the
/// first match of the winning pattern is returned. Values are limited to
/// characters that are safe to splice unquoted into a command line.
pub fn capture_resume_id(text: &str) -> Option<String> {
    if let Some(caps) = SESSION_ID_FIELD.captures(text) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    BARE_UUID.find(text).map(|m| m.as_str().to_string())
}
