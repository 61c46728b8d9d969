use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref ANGLE_BRACKETS: Regex = Regex::new(r"[<>]").unwrap();
    static ref JAVASCRIPT_PROTOCOL: Regex = Regex::new(r"(?i)javascript\s*:").unwrap();
    static ref EVENT_HANDLER: Regex = Regex::new(r"(?i)\bon[a-z]+\s*=").unwrap();
}

fn strip_once(input: &str) -> String {
    let stripped = ANGLE_BRACKETS.replace_all(input, "");
    let stripped = JAVASCRIPT_PROTOCOL.replace_all(&stripped, "");
    EVENT_HANDLER.replace_all(&stripped, "").into_owned()
}

/// Strips markup that could turn into script when echoed back to a browser.
/// Repeats until nothing changes, so nested payloads cannot reassemble.
pub fn sanitize_str(input: &str) -> String {
    let mut current = strip_once(input);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Sanitizes every string in the value, recursing into arrays and objects.
/// Object keys are left alone.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}
