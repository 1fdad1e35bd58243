use serde_json::Value;

/// String forms that curators use to mark a field as not recorded.
const MISSING_SENTINELS: &[&str] = &["", "Missing", "None"];

/// Canonical comparable form of a scalar field value, or `None` when the
/// value is missing (null, empty, or a missing-sentinel string).
///
/// Numbers and booleans compare as their string forms; `25` and `"25"`
/// normalize identically but `25.0` does not.
pub fn normalize(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(raw) => raw.trim().to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    };

    if MISSING_SENTINELS.contains(&text.as_str()) {
        return None;
    }

    Some(text)
}

pub fn is_missing(value: &Value) -> bool {
    normalize(value).is_none()
}
