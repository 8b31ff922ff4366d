//! Backend responses read the way the page script reads them.
//!
//! The page treats the body as a JavaScript value: `error` is tested for
//! truthiness, concatenated into a string, and the whole value goes through
//! `JSON.stringify(data, null, 2)`. The helpers here reproduce those
//! conversions on a `serde_json::Value` parsed with `arbitrary_precision`,
//! so number literals are still available as written.

use serde_json::{Map, Number, Value};

/// `JSON.stringify(value, null, 2)`.
///
/// Numbers are printed with JavaScript's `Number#toString` (`3.0` becomes
/// `3`, non-finite values become `null`), and object keys that are array
/// indices come first in ascending order, as in any JS object.
pub fn stringify_pretty(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&js_normalized(value))
}

/// JavaScript truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            let x = number_value(n);
            x != 0.0 && !x.is_nan()
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JavaScript `String(value)`.
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(number_value(n)),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".into(),
    }
}

fn js_normalized(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            let x = number_value(n);
            if !x.is_finite() {
                return Value::Null;
            }
            serde_json::from_str(&number_to_string(x)).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(js_normalized).collect()),
        Value::Object(map) => Value::Object(
            js_key_order(map)
                .into_iter()
                .map(|(k, v)| (k.clone(), js_normalized(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Array-index keys ascending, then the remaining keys in insertion order.
fn js_key_order(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut indexed: Vec<(u32, &String, &Value)> = map
        .iter()
        .filter_map(|(k, v)| array_index(k).map(|i| (i, k, v)))
        .collect();
    indexed.sort_by_key(|(i, _, _)| *i);

    indexed
        .into_iter()
        .map(|(_, k, v)| (k, v))
        .chain(map.iter().filter(|(k, _)| array_index(k).is_none()))
        .collect()
}

/// A canonical decimal integer below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

/// The literal as a double, the way `JSON.parse` reads it (`1e400` is infinity).
fn number_value(n: &Number) -> f64 {
    n.to_string().parse().unwrap_or(f64::NAN)
}

/// `Number#toString` for doubles.
fn number_to_string(x: f64) -> String {
    if x.is_nan() {
        return "NaN".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if x == 0.0 {
        return "0".into();
    }
    let abs = x.abs();
    if (1e-6..1e21).contains(&abs) {
        return x.to_string();
    }
    let exp = format!("{:e}", x);
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}
