use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use crate::errors::{EvalError, Result};

/// Trait for pluggable functions callable from template expressions.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtins::Lower);
        registry.register(builtins::Upper);
        registry.register(builtins::Trim);
        registry.register(builtins::Length);
        registry.register(builtins::Join);
        registry.register(builtins::Not);
        registry.register(builtins::Contains);
        registry.register(builtins::First);
        registry.register(builtins::Unique);
        registry.register(builtins::OrDefault);
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    /// Look up `name`, check its arity, and call it.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let f = self
            .get(name)
            .ok_or_else(|| EvalError::Runtime(format!("unknown function `{name}`")))?;
        let arity = f.arity();
        if !arity.contains(&args.len()) {
            return Err(EvalError::Runtime(format!(
                "`{name}` expects {}..={} arguments, got {}",
                arity.start(),
                arity.end(),
                args.len()
            )));
        }
        f.call(args)
    }
}

pub mod builtins {
    use super::*;
    use crate::value::{is_truthy, to_text};
    use itertools::Itertools;
    use serde_json::Value;

    static NULL: Value = Value::Null;

    /// Positional argument, null when absent.
    fn arg(args: &[Value], i: usize) -> &Value {
        args.get(i).unwrap_or(&NULL)
    }

    pub struct Lower;
    impl Function for Lower {
        fn name(&self) -> &'static str { "lower" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::String(t) => Value::String(t.to_lowercase()),
                other => other.clone(),
            })
        }
    }

    pub struct Upper;
    impl Function for Upper {
        fn name(&self) -> &'static str { "upper" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::String(t) => Value::String(t.to_uppercase()),
                other => other.clone(),
            })
        }
    }

    pub struct Trim;
    impl Function for Trim {
        fn name(&self) -> &'static str { "trim" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::String(t) => Value::String(t.trim().to_string()),
                other => other.clone(),
            })
        }
    }

    /// Characters of a string, items of a list, keys of an object.
    pub struct Length;
    impl Function for Length {
        fn name(&self) -> &'static str { "length" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            match arg(args, 0) {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(o) => Ok(Value::from(o.len())),
                Value::Null => Ok(Value::from(0)),
                other => Err(EvalError::Runtime(format!("length of non-collection {other}"))),
            }
        }
    }

    pub struct Join;
    impl Function for Join {
        fn name(&self) -> &'static str { "join" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let sep = args.get(1).map(to_text).unwrap_or_else(|| ", ".to_string());
            Ok(match arg(args, 0) {
                Value::Array(items) => Value::String(items.iter().map(to_text).join(&sep)),
                other => Value::String(to_text(other)),
            })
        }
    }

    pub struct Not;
    impl Function for Not {
        fn name(&self) -> &'static str { "not" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::Bool(!is_truthy(arg(args, 0))))
        }
    }

    /// Substring test for strings, membership test for lists.
    pub struct Contains;
    impl Function for Contains {
        fn name(&self) -> &'static str { "contains" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(Value::Bool(match arg(args, 0) {
                Value::String(s) => s.contains(to_text(arg(args, 1)).as_str()),
                Value::Array(items) => items.contains(arg(args, 1)),
                _ => false,
            }))
        }
    }

    pub struct First;
    impl Function for First {
        fn name(&self) -> &'static str { "first" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Array(a) => a.first().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            })
        }
    }

    pub struct Unique;
    impl Function for Unique {
        fn name(&self) -> &'static str { "unique" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=1 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Array(a) => Value::Array(
                    a.iter()
                        .cloned()
                        .unique_by(|x| serde_json::to_string(x).unwrap_or_default())
                        .collect(),
                ),
                other => other.clone(),
            })
        }
    }

    /// Falls back when the value is null, an empty string or an empty list.
    pub struct OrDefault;
    impl Function for OrDefault {
        fn name(&self) -> &'static str { "or_default" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 2..=2 }
        fn call(&self, args: &[Value]) -> Result<Value> {
            Ok(match arg(args, 0) {
                Value::Null => arg(args, 1).clone(),
                Value::String(s) if s.is_empty() => arg(args, 1).clone(),
                Value::Array(a) if a.is_empty() => arg(args, 1).clone(),
                other => other.clone(),
            })
        }
    }
}
