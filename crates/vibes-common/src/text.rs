//! Character-based text helpers.
//!
//! All lengths are counted in `char`s, which is how the message channel
//! measures its limit.

use std::time::Duration;

pub const TRUNCATION_MARKER: &str = "\n…(truncated)…\n";

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Keeps the first `limit` chars.
pub fn head_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Keeps the last `limit` chars.
pub fn tail_chars(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= limit {
        return text;
    }
    match text.char_indices().nth(total - limit) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Cuts the middle out of `text` so the result is at most `limit` chars.
///
/// Head and tail are both kept since command output usually has the
/// interesting parts at either end.
pub fn truncate_middle(text: &str, limit: usize) -> String {
    let total = char_len(text);
    if total <= limit {
        return text.to_string();
    }
    let marker_len = char_len(TRUNCATION_MARKER);
    if limit <= marker_len + 2 {
        return head_chars(text, limit).to_string();
    }
    let room = limit - marker_len;
    let head = room / 2;
    let tail = room - head;
    format!(
        "{}{}{}",
        head_chars(text, head),
        TRUNCATION_MARKER,
        tail_chars(text, tail)
    )
}

/// Formats as `Xm Ys`, with whole seconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
