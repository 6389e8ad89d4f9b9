//! Extension traits for `serde_json::Value` used when picking apart engine events.

use serde_json::Value;

pub trait ValueExt {
    /// String field, `None` when missing, not a string, or empty.
    fn str_field(&self, key: &str) -> Option<&str>;

    /// Get a string field or return default.
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;

    /// Integer field, accepting both signed and unsigned encodings.
    fn i64_field(&self, key: &str) -> Option<i64>;

    /// Looks up `key` at top level and then under the `data` object.
    fn str_field_or_data(&self, key: &str) -> Option<&str>;

    /// Walks a dotted path such as `thread.id`.
    fn str_path(&self, path: &str) -> Option<&str>;
}

impl ValueExt for Value {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn i64_field(&self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().and_then(|v| i64::try_from(v).ok()))
    }

    fn str_field_or_data(&self, key: &str) -> Option<&str> {
        self.str_field(key)
            .or_else(|| self.get("data").and_then(|data| data.str_field(key)))
    }

    fn str_path(&self, path: &str) -> Option<&str> {
        let mut node = self;
        for part in path.split('.') {
            node = node.get(part)?;
        }
        node.as_str().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn str_field_skips_empty_and_non_strings() {
        let v = json!({"a": "", "b": 3, "c": "x"});
        assert_eq!(v.str_field("a"), None);
        assert_eq!(v.str_field("b"), None);
        assert_eq!(v.str_field("c"), Some("x"));
    }

    #[test]
    fn data_fallback_and_paths() {
        let v = json!({"data": {"delta": "hi"}, "thread": {"id": "t1"}});
        assert_eq!(v.str_field_or_data("delta"), Some("hi"));
        assert_eq!(v.str_path("thread.id"), Some("t1"));
        assert_eq!(v.str_path("thread.name"), None);
    }

    #[test]
    fn i64_field_reads_numbers() {
        let v = json!({"exit_code": -1, "big": 7u64, "s": "1"});
        assert_eq!(v.i64_field("exit_code"), Some(-1));
        assert_eq!(v.i64_field("big"), Some(7));
        assert_eq!(v.i64_field("s"), None);
        assert_eq!(v.str_or("missing", "d"), "d");
    }
}
