//! Discovery of the resumable conversation token in engine records.
//!
//! Explicit, well-known fields always win. The deep scan is a fallback for
//! thread-start records whose layout we don't recognize.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

pub const DEEP_SCAN_MAX_DEPTH: usize = 6;

#[allow(clippy::expect_used)]
fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
        )
        .expect("uuid pattern is a valid regex")
    })
}

/// Returns the first UUID-shaped substring of a string value.
pub fn uuid_in(value: &Value) -> Option<&str> {
    let text = value.as_str()?;
    uuid_regex().find(text).map(|m| m.as_str())
}

/// Token from the known field locations, in precedence order:
/// `session_id`, `thread_id`, `thread.id`, `session.id`, then the same four
/// under `data`.
pub fn explicit_token(record: &Value) -> Option<String> {
    let scopes = std::iter::once(record).chain(record.get("data").filter(|d| d.is_object()));
    for scope in scopes {
        let candidates = [
            scope.get("session_id"),
            scope.get("thread_id"),
            scope.get("thread").and_then(|t| t.get("id")),
            scope.get("session").and_then(|s| s.get("id")),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(token) = uuid_in(candidate) {
                return Some(token.to_string());
            }
        }
    }
    None
}

/// Depth-bounded search for any UUID-shaped string in `record`.
///
/// Objects check `session_id`, `thread_id` and `id` before descending into
/// their values. Nodes are tracked by address so shared subtrees are only
/// visited once.
pub fn deep_scan_token(record: &Value) -> Option<String> {
    let mut seen = HashSet::new();
    walk(record, 0, &mut seen).map(str::to_string)
}

fn walk<'a>(node: &'a Value, depth: usize, seen: &mut HashSet<usize>) -> Option<&'a str> {
    if depth > DEEP_SCAN_MAX_DEPTH {
        return None;
    }
    if !seen.insert(node as *const Value as usize) {
        return None;
    }
    if let Some(token) = uuid_in(node) {
        return Some(token);
    }
    match node {
        Value::Object(map) => {
            for key in ["session_id", "thread_id", "id"] {
                if let Some(token) = map.get(key).and_then(uuid_in) {
                    return Some(token);
                }
            }
            map.values().find_map(|child| walk(child, depth + 1, seen))
        }
        Value::Array(items) => items.iter().find_map(|child| walk(child, depth + 1, seen)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const A: &str = "11111111-2222-3333-4444-555555555555";
    const B: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    #[test]
    fn explicit_fields_in_precedence_order() {
        let record = json!({"thread": {"id": B}, "thread_id": A});
        assert_eq!(explicit_token(&record).as_deref(), Some(A));

        let nested = json!({"data": {"session": {"id": B}}});
        assert_eq!(explicit_token(&nested).as_deref(), Some(B));
    }

    #[test]
    fn explicit_ignores_non_uuid_values() {
        let record = json!({"session_id": "not-a-uuid", "thread_id": 42});
        assert_eq!(explicit_token(&record), None);
    }

    #[test]
    fn deep_scan_finds_nested_uuid() {
        let record = json!({"type": "thread.started", "payload": {"meta": [{"ref": format!("conv {}", B)}]}});
        assert_eq!(deep_scan_token(&record).as_deref(), Some(B));
    }

    #[test]
    fn deep_scan_is_depth_bounded() {
        let mut node = json!(A);
        for _ in 0..(DEEP_SCAN_MAX_DEPTH + 2) {
            node = json!({ "x": node });
        }
        assert_eq!(deep_scan_token(&node), None);

        let mut shallow = json!(A);
        for _ in 0..DEEP_SCAN_MAX_DEPTH {
            shallow = json!({ "x": shallow });
        }
        assert_eq!(deep_scan_token(&shallow).as_deref(), Some(A));
    }

    #[test]
    fn deep_scan_prefers_id_keys_at_same_level() {
        let record = json!({"a": {"note": B}, "id": A});
        assert_eq!(deep_scan_token(&record).as_deref(), Some(A));
    }
}
