//! Small value helpers shared by the loader and the processors.

use regex::Regex;
use serde_json::Value;

/// Coerce a value into a list.
///
/// `Null` becomes an empty list, arrays are returned as they are and any
/// other value becomes a single-element list.
pub fn arg_to_iter(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Same as [`arg_to_iter`] but for an optional value; `None` is empty.
pub fn opt_to_iter(value: Option<Value>) -> Vec<Value> {
    value.map(arg_to_iter).unwrap_or_default()
}

/// Deep-flatten nested arrays into a single list.
pub fn flatten<I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Array(items) => out.extend(flatten(items)),
            other => out.push(other),
        }
    }
    out
}

/// Extract strings from `text` using `regex`.
///
/// If the pattern has a named group `extract`, only that group is returned,
/// and nothing when the group takes no part in the match. Otherwise every
/// match contributes its capture groups (or the whole match when the pattern
/// has no groups).
pub fn extract_regex(regex: &Regex, text: &str) -> Vec<String> {
    if regex.capture_names().any(|name| name == Some("extract")) {
        return regex
            .captures(text)
            .and_then(|c| c.name("extract"))
            .map(|found| vec![found.as_str().to_string()])
            .unwrap_or_default();
    }

    let mut out = Vec::new();
    for captures in regex.captures_iter(text) {
        if captures.len() == 1 {
            out.push(captures[0].to_string());
            continue;
        }
        for group in captures.iter().skip(1) {
            out.push(group.map(|m| m.as_str().to_string()).unwrap_or_default());
        }
    }
    out
}

/// Render a value for diagnostics.
pub(crate) fn render(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn render_opt(value: Option<&Value>) -> String {
    match value {
        Some(v) => render(v),
        None => "None".to_string(),
    }
}

/// Text used when a non-string value goes through a regex.
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `true` for values that should not be appended to a field.
pub(crate) fn is_empty(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}
