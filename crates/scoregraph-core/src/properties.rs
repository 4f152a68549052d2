//! Property bags and the value coercions applied on their way in and out of the store.
//!
//! The store only keeps numbers and strings. Booleans travel as `"True"`/`"False"`,
//! missing values as `"None"`, and anything composite as its JSON text.

use serde_json::{Map, Number, Value};

/// A vertex or edge property bag.
pub type Properties = Map<String, Value>;

/// Text form of a boolean as stored in the graph.
pub fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Convert one value to the form kept in the store.
pub fn to_stored(value: &Value) -> Value {
    match value {
        Value::Null => Value::String("None".to_string()),
        Value::Bool(b) => Value::String(bool_text(*b).to_string()),
        Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
    }
}

/// Convert every value of a bag to its stored form.
pub fn stored_bag(props: &Properties) -> Properties {
    props
        .iter()
        .map(|(k, v)| (k.clone(), to_stored(v)))
        .collect()
}

/// Reverse of [`to_stored`] for a single value.
///
/// `"True"`, `"False"` and `"None"` become literals; strings that look numeric
/// become numbers (a decimal point selects a float).
pub fn from_stored(value: &Value) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    match text.as_str() {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }
    if text.contains('.') {
        if let Ok(f) = text.parse::<f64>() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    } else if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    value.clone()
}

/// Integer view of a stored or in-memory value.
pub fn as_i64(value: &Value) -> Option<i64> {
    match from_stored(value) {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

/// Float view of a stored or in-memory value.
pub fn as_f64(value: &Value) -> Option<f64> {
    match from_stored(value) {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Boolean view; accepts both literals and the stored text form.
pub fn as_bool(value: &Value) -> Option<bool> {
    match from_stored(value) {
        Value::Bool(b) => Some(b),
        _ => None,
    }
}

/// Build a JSON number from a float, falling back to null for NaN/infinity.
pub fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
