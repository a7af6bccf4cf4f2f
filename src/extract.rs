use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Defensive field extraction from vendor-controlled JSON.
///
/// The crawler payload shape is not under our control and has changed
/// shape more than once. Instead of chaining lookups inline at each call
/// site, every logical field is pulled out by trying an explicit ordered
/// list of candidate keys; the first non-empty hit wins.

/// Unwrap nested `payload`/`data`/`resource` envelopes down to the
/// innermost object. Returns `None` when the value is not an object.
pub fn unwrap_envelope(raw: &Value) -> Option<&serde_json::Map<String, Value>> {
    let obj = raw.as_object()?;
    for key in ["payload", "data", "resource"] {
        if let Some(inner) = obj.get(key) {
            if inner.is_object() {
                return unwrap_envelope(inner);
            }
        }
    }
    Some(obj)
}

/// First candidate key holding a non-empty string. Non-string scalars
/// (the vendor has sent ISBNs as numbers) are stringified.
pub fn first_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Sanitize a breadcrumb-style array: entries are either plain strings or
/// objects carrying the label under `text`/`title`/`name`. Trims, drops
/// empties, dedupes preserving first-occurrence order. `None` when the
/// value is not an array or nothing survives.
pub fn sanitize_string_array(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let mut cleaned: Vec<String> = Vec::new();
    for item in items {
        let label = match item {
            Value::String(s) => s.trim().to_string(),
            Value::Object(entry) => ["text", "title", "name"]
                .iter()
                .find_map(|k| entry.get(*k).and_then(Value::as_str))
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        if !label.is_empty() && !cleaned.contains(&label) {
            cleaned.push(label);
        }
    }
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// First candidate key yielding a non-empty sanitized string array.
pub fn first_string_array(
    obj: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<Vec<String>> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(sanitize_string_array)
}

/// First candidate key holding a parseable timestamp. Unparseable values
/// become `None`, never an error.
pub fn first_timestamp(
    obj: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .find_map(parse_timestamp)
}

/// Lenient timestamp parsing: RFC 3339 first, then a bare date.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}
