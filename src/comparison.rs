use std::cmp::Ordering;

use serde_json::Value;

/// Order two values for the `<`, `<=`, `>`, `>=` operators.
///
/// Numbers compare numerically, also against numeric strings; strings and
/// booleans compare naturally. Anything else has no ordering.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        (Value::Number(na), Value::Number(nb)) => na.as_f64()?.partial_cmp(&nb.as_f64()?),
        (Value::Bool(ba), Value::Bool(bb)) => Some(ba.cmp(bb)),
        (Value::Number(na), Value::String(sb)) => {
            na.as_f64()?.partial_cmp(&sb.trim().parse::<f64>().ok()?)
        }
        (Value::String(sa), Value::Number(nb)) => {
            sa.trim().parse::<f64>().ok()?.partial_cmp(&nb.as_f64()?)
        }
        _ => None,
    }
}

/// Equality for `=` / `==` / `!=`. Numbers are equal when numerically equal
/// so `1` and `1.0` match; a numeric string equals the number it spells.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}
