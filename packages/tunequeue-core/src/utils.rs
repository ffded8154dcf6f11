//! General utilities shared across the application.

use crate::protocol_constants::YOUTU_BE_PREFIX;

// ─────────────────────────────────────────────────────────────────────────────
// Duration Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a clock-style duration (`"3:45"`, `"1:02:03"`, `"45"`) into seconds.
///
/// Returns `None` for anything that is not one to three colon-separated
/// integer fields.
#[must_use]
pub fn parse_clock_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let fields: Vec<&str> = raw.split(':').collect();
    if fields.len() > 3 {
        return None;
    }
    fields.iter().try_fold(0u64, |acc, field| {
        let value: u64 = field.parse().ok()?;
        Some(acc * 60 + value)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the short watch link used in chat replies.
#[must_use]
pub fn short_link(video_id: &str) -> String {
    format!("{}{}", YOUTU_BE_PREFIX, video_id)
}

/// Truncates `text` to at most `max` characters for log output.
#[must_use]
pub fn truncate_for_log(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
