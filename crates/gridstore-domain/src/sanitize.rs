//! Value sanitization and SQL identifier validation.
//!
//! Two concerns with one rule each: user-supplied *values* are walked
//! recursively and stripped of markup, user-supplied *identifiers* are
//! validated against a strict regex and never interpolated otherwise.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// `<script>...</script>` blocks including their text content.
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>").unwrap()
});

/// Any remaining markup tag; text content is preserved.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?s)</?[A-Za-z!][^>]*>").unwrap()
});

/// Canonical storage names: `^[A-Za-z_][A-Za-z0-9_-]*$`.
static STORAGE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap()
});

/// Query aliases: `^[A-Za-z_][A-Za-z0-9_]*$`.
static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
});

/// Strip markup from a single string, keeping text content.
#[must_use]
pub fn sanitize_text(input: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(input, "");
    TAG_RE.replace_all(&without_scripts, "").into_owned()
}

/// Recursively sanitize a JSON value: strings are stripped of markup,
/// arrays and objects are walked, and object *keys* are sanitized too so a
/// hostile nested key cannot smuggle markup past the walk.
#[must_use]
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (sanitize_text(&k), sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Validate a column storage name. Invalid names are a caller error and are
/// never interpolated into SQL.
pub fn ensure_storage_name(name: &str) -> Result<&str> {
    if STORAGE_NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(Error::bad_request(format!(
            "invalid column storage name: {name:?}"
        )))
    }
}

/// Validate a query alias.
pub fn ensure_alias(name: &str) -> Result<&str> {
    if ALIAS_RE.is_match(name) {
        Ok(name)
    } else {
        Err(Error::bad_request(format!("invalid alias: {name:?}")))
    }
}

/// Validate an identifier and wrap it in double quotes for embedding.
pub fn quote_ident(name: &str) -> Result<String> {
    ensure_storage_name(name)?;
    Ok(format!("\"{name}\""))
}

/// Derive a storage-safe name from a free-form title: lowercased, runs of
/// non-identifier characters collapsed to `_`, leading digit prefixed.
#[must_use]
pub fn storage_name_from_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    let base = if trimmed.is_empty() { "field" } else { trimmed };
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        format!("f_{base}")
    } else {
        base.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_script_blocks_entirely() {
        assert_eq!(
            sanitize_text("a<script>alert('x')</script>b"),
            "ab".to_owned()
        );
    }

    #[test]
    fn strips_tags_but_keeps_text() {
        assert_eq!(sanitize_text("<b>bold</b> move"), "bold move");
    }

    #[test]
    fn walks_nested_values_and_keys() {
        let dirty = json!({
            "<i>title</i>": "<b>hello</b>",
            "items": ["<script>x</script>safe", 3],
        });
        let clean = sanitize_value(dirty);
        assert_eq!(clean, json!({"title": "hello", "items": ["safe", 3]}));
    }

    #[test]
    fn storage_names_reject_quotes_and_spaces() {
        assert!(ensure_storage_name("good_name-1").is_ok());
        assert!(ensure_storage_name("bad name").is_err());
        assert!(ensure_storage_name("drop\";--").is_err());
        assert!(ensure_storage_name("1leading").is_err());
    }

    #[test]
    fn aliases_are_stricter_than_storage_names() {
        assert!(ensure_storage_name("a-b").is_ok());
        assert!(ensure_alias("a-b").is_err());
        assert!(ensure_alias("a_b").is_ok());
    }

    #[test]
    fn quoting_wraps_valid_idents() {
        assert_eq!(quote_ident("data").ok(), Some("\"data\"".to_owned()));
        assert!(quote_ident("da\"ta").is_err());
    }

    #[test]
    fn titles_become_storage_safe_names() {
        assert_eq!(storage_name_from_title("My Column!"), "my_column");
        assert_eq!(storage_name_from_title("2nd try"), "f_2nd_try");
        assert_eq!(storage_name_from_title("---"), "field");
    }
}
