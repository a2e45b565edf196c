use crate::context::Context;
use crate::template::EvalOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Key {
    template: String,
    context: u64,
    options: EvalOptions,
}

/// Single-entry cache of the last pipeline output for one field.
///
/// Keyed on the template text, the context fingerprint and the evaluation
/// options; any change is a miss and replaces the entry.
#[derive(Debug, Clone)]
pub struct Memo<T> {
    last: Option<(Key, T)>,
    hits: u64,
    misses: u64,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self { last: None, hits: 0, misses: 0 }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&mut self, template: &str, ctx: &Context, options: EvalOptions, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        let key = Key { template: template.to_string(), context: ctx.fingerprint(), options };
        if let Some((last_key, value)) = &self.last {
            if *last_key == key {
                self.hits += 1;
                return value.clone();
            }
        }
        self.misses += 1;
        let value = compute();
        self.last = Some((key, value.clone()));
        value
    }

    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recomputes_only_when_inputs_change() {
        let mut memo = Memo::new();
        let ctx = Context::from_value(json!({"n": 1})).unwrap();
        let mut calls = 0;
        for _ in 0..3 {
            memo.get_or_compute("t", &ctx, EvalOptions::default(), || {
                calls += 1;
                "out".to_string()
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(memo.stats(), (2, 1));

        let changed = Context::from_value(json!({"n": 2})).unwrap();
        memo.get_or_compute("t", &changed, EvalOptions::default(), || "new".to_string());
        memo.get_or_compute("t", &changed, EvalOptions::strict(), || "strict".to_string());
        memo.invalidate();
        let v = memo.get_or_compute("t", &changed, EvalOptions::strict(), || "again".to_string());
        assert_eq!(v, "again");
        assert_eq!(memo.stats(), (2, 4));
    }
}
