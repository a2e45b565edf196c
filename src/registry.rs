use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::Context;
use crate::errors::{Diagnostic, EvalError, Result};
use crate::field::{FieldConfig, TooltipField, TOOLTIP_TYPE};
use crate::pipeline::Pipeline;
use crate::view::{bind_id, TooltipNode, TooltipView};

/// What the host passes to a field renderer on every render pass.
#[derive(Debug, Clone, Default)]
pub struct FormContext {
    pub form_id: Option<String>,
    pub context: Context,
}

impl FormContext {
    pub fn new(form_id: Option<String>, context: Context) -> Self {
        Self { form_id, context }
    }
}

/// Markup for one field plus anything for its error channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub binding_id: String,
    pub html: String,
    pub failed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl From<TooltipNode> for RenderedField {
    fn from(node: TooltipNode) -> Self {
        Self {
            html: node.to_html(),
            binding_id: node.binding_id,
            failed: node.state == crate::view::ContentState::Failed,
            diagnostics: node.diagnostics,
        }
    }
}

/// A renderer for one field type.
pub trait FormField: Send + Sync {
    fn config(&self) -> FieldConfig;
    fn create(&self, options: Map<String, Value>) -> Map<String, Value>;
    fn render(&self, field: &Value, form: &FormContext) -> Result<RenderedField>;
}

/// Field type registry owned by the host, keyed by the schema `type` tag.
#[derive(Clone, Default)]
pub struct FormFields {
    inner: Arc<HashMap<String, Arc<dyn FormField>>>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, field: Arc<dyn FormField>) {
        Arc::make_mut(&mut self.inner).insert(kind.into(), field);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn FormField>> {
        self.inner.get(kind).cloned()
    }

    pub fn types(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    /// Dispatch a raw schema field to the renderer registered for its type.
    pub fn render(&self, field: &Value, form: &FormContext) -> Result<RenderedField> {
        let kind = field
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::Contract("field has no string `type`".into()))?;
        let renderer = self
            .get(kind)
            .ok_or_else(|| EvalError::Contract(format!("no renderer registered for `{kind}`")))?;
        debug!(kind, "dispatching field render");
        renderer.render(field, form)
    }
}

/// Tooltip renderer. Each mounted field, keyed by its binding id, keeps a
/// [`TooltipView`] so re-rendering unchanged inputs skips the pipeline.
pub struct TooltipRenderer {
    pipeline: Arc<Pipeline>,
    views: Mutex<HashMap<String, TooltipView>>,
}

impl TooltipRenderer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline, views: Mutex::new(HashMap::new()) }
    }

    /// `(hits, misses)` of the view mounted under `binding_id`.
    pub fn cache_stats(&self, binding_id: &str) -> Option<(u64, u64)> {
        let views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views.get(binding_id).map(TooltipView::cache_stats)
    }

    /// Drop the view of an unmounted field.
    pub fn unmount(&self, binding_id: &str) {
        self.views.lock().unwrap_or_else(PoisonError::into_inner).remove(binding_id);
    }
}

impl FormField for TooltipRenderer {
    fn config(&self) -> FieldConfig {
        FieldConfig::tooltip()
    }

    fn create(&self, options: Map<String, Value>) -> Map<String, Value> {
        TooltipField::create(options)
    }

    fn render(&self, field: &Value, form: &FormContext) -> Result<RenderedField> {
        let field = TooltipField::from_value(field)?;
        let form_id = form.form_id.as_deref();
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        let view = views
            .entry(bind_id(form_id, &field.id))
            .or_insert_with(|| TooltipView::new(Arc::clone(&self.pipeline)));
        Ok(view.render(&field, form_id, &form.context).into())
    }
}

/// Installs the tooltip field type into a host registry.
pub struct TooltipExtension;

impl TooltipExtension {
    pub fn register(fields: &mut FormFields, pipeline: Arc<Pipeline>) {
        fields.register(TOOLTIP_TYPE, Arc::new(TooltipRenderer::new(pipeline)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields() -> FormFields {
        let mut fields = FormFields::new();
        TooltipExtension::register(&mut fields, Arc::new(Pipeline::default()));
        fields
    }

    #[test]
    fn dispatches_by_type() {
        let form = FormContext::new(
            Some("f1".into()),
            Context::from_value(json!({"name": "World"})).unwrap(),
        );
        let out = fields()
            .render(&json!({"type": "tooltip", "id": "t1", "text": "**Hello** {{name}}"}), &form)
            .unwrap();
        assert_eq!(out.binding_id, "fjs-form-f1-t1");
        assert!(out.html.contains("<p><strong>Hello</strong> World</p>"));
        assert!(!out.failed);
        assert_eq!(fields().types(), vec!["tooltip"]);
    }

    #[test]
    fn unknown_or_missing_types_violate_the_contract() {
        let form = FormContext::default();
        let err = fields().render(&json!({"type": "select", "id": "s"}), &form).unwrap_err();
        assert!(!err.is_recoverable());
        let err = fields().render(&json!({"id": "s"}), &form).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn rerenders_reuse_the_mounted_view() {
        let renderer = TooltipRenderer::new(Arc::new(Pipeline::default()));
        let field = json!({"type": "tooltip", "id": "t1", "text": "Hi {{name}}"});
        let a = FormContext::new(None, Context::from_value(json!({"name": "A"})).unwrap());
        let b = FormContext::new(None, Context::from_value(json!({"name": "B"})).unwrap());

        let first = renderer.render(&field, &a).unwrap();
        assert_eq!(renderer.render(&field, &a).unwrap(), first);
        let changed = renderer.render(&field, &b).unwrap();
        assert!(changed.html.contains("<p>Hi B</p>"));
        assert_eq!(renderer.cache_stats("fjs-form-t1"), Some((1, 2)));

        renderer.unmount("fjs-form-t1");
        assert_eq!(renderer.cache_stats("fjs-form-t1"), None);
    }

    #[test]
    fn strict_failures_stay_on_the_field() {
        let form = FormContext::default();
        let out = fields()
            .render(&json!({"type": "tooltip", "id": "t", "text": "{{x}}", "strict": true}), &form)
            .unwrap();
        assert!(out.failed);
        assert_eq!(out.diagnostics.len(), 1);
    }
}
