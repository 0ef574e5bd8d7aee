//! Debug-marker extraction from message text.
//!
//! Bots under test embed `key: value` markers in their replies
//! (`menu_id`, `callback_id`, `pending_action`, `error_code`). Extraction
//! is a pure scan: the value runs from the first `<key>:` occurrence to the
//! next line break.

use serde::{Deserialize, Serialize};

/// Marker keys harvested from every observed message.
pub const DEBUG_MARKER_KEYS: [&str; 4] =
    ["menu_id", "callback_id", "pending_action", "error_code"];

/// Extract the value following `<key>:` up to the next line break.
/// Returns `None` when the key is absent or the value is empty.
pub fn extract_marker(text: &str, key: &str) -> Option<String> {
    let needle = format!("{key}:");
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Markers harvested from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMarkers {
    pub menu_id: Option<String>,
    pub callback_id: Option<String>,
    pub pending_action: Option<String>,
    pub error_code: Option<String>,
}

impl DebugMarkers {
    pub fn extract(text: &str) -> Self {
        Self {
            menu_id: extract_marker(text, "menu_id"),
            callback_id: extract_marker(text, "callback_id"),
            pending_action: extract_marker(text, "pending_action"),
            error_code: extract_marker(text, "error_code"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.menu_id.is_none()
            && self.callback_id.is_none()
            && self.pending_action.is_none()
            && self.error_code.is_none()
    }
}

/// Whether a message text matches a configured success or failure phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Success,
    Failure,
}

/// Match text against the expected-success list first, then the
/// expected-failure list. Empty phrases never match.
pub fn match_expectation(
    text: &str,
    success_messages: &[String],
    failure_messages: &[String],
) -> Option<Expectation> {
    if success_messages
        .iter()
        .any(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
    {
        return Some(Expectation::Success);
    }
    if failure_messages
        .iter()
        .any(|phrase| !phrase.is_empty() && text.contains(phrase.as_str()))
    {
        return Some(Expectation::Failure);
    }
    None
}
