//! Helpers over the flat `name -> value` mapping a form works with.

use serde_json::{Map, Value};

/// Current form values keyed by field name.
pub type ValueMap = Map<String, Value>;

/// Resolves `path` against the mapping.
///
/// Exact keys win, so dotted field names such as `education.0.school` work
/// as plain keys. Otherwise the path is walked segment by segment through
/// nested objects and arrays; `a[0].b` and `a.0.b` are equivalent.
pub fn lookup<'a>(values: &'a ValueMap, path: &str) -> Option<&'a Value> {
    if let Some(value) = values.get(path) {
        return Some(value);
    }

    let normalized = path.replace('[', ".").replace(']', "");
    let mut segments = normalized.split('.').filter(|segment| !segment.is_empty());
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Empty in the form sense: nothing was entered or selected.
///
/// `0` is a real answer and is not empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Loose equality used by conditions and list membership.
///
/// Numbers match numeric strings, booleans match `"true"`/`"false"` and null
/// matches the empty string.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::String(text)) | (Value::String(text), Value::Null) => text.is_empty(),
        (Value::Number(number), Value::String(text))
        | (Value::String(text), Value::Number(number)) => {
            match (number.as_f64(), text.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(flag), Value::String(text)) | (Value::String(text), Value::Bool(flag)) => {
            text == if *flag { "true" } else { "false" }
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Renders a scalar as the string a widget would show.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Scalar text of a value, or `None` for arrays and objects.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        scalar => Some(display(scalar)),
    }
}
