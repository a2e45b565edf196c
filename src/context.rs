use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::errors::{EvalError, Result};

/// Evaluation context handed to every pipeline call.
///
/// Holds the current form data plus a separate layer of ambient variables
/// supplied by the host. Lookups check the form data first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    data: Map<String, Value>,
    variables: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from raw form data. The root must be an object (or
    /// null, which is treated as empty).
    pub fn from_value(data: Value) -> Result<Self> {
        match data {
            Value::Object(data) => Ok(Self { data, variables: Map::new() }),
            Value::Null => Ok(Self::default()),
            other => Err(EvalError::Contract(format!(
                "form data must be a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name).or_else(|| self.variables.get(name))
    }

    /// Root scope as a value, used for `parent` at the outermost loop level.
    pub(crate) fn root(&self) -> Value {
        let mut merged = self.variables.clone();
        for (k, v) in &self.data {
            merged.insert(k.clone(), v.clone());
        }
        Value::Object(merged)
    }

    /// Stable hash of the context content. serde_json keeps object keys
    /// sorted, so equal contexts serialize identically.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(&self.data)
            .unwrap_or_default()
            .hash(&mut hasher);
        serde_json::to_string(&self.variables)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn data_shadows_variables() {
        let ctx = Context::from_value(json!({"name": "data"}))
            .unwrap()
            .with_variable("name", json!("ambient"))
            .with_variable("today", json!("2024-01-01"));
        assert_eq!(ctx.get("name"), Some(&json!("data")));
        assert_eq!(ctx.get("today"), Some(&json!("2024-01-01")));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn non_object_root_is_contract_violation() {
        let err = Context::from_value(json!([1, 2])).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(Context::from_value(Value::Null).is_ok());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Context::from_value(json!({"a": 1, "b": 2})).unwrap();
        let b = Context::from_value(json!({"b": 2, "a": 1})).unwrap();
        let c = Context::from_value(json!({"a": 1, "b": 3})).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
