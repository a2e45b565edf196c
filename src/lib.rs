pub mod errors;
pub mod context;
pub mod config;
pub mod functions;  // plugin model for template functions
pub mod template;
pub mod markdown;
pub mod sanitize;
pub mod memo;
pub mod pipeline;
pub mod field;
pub mod view;
pub mod registry;
pub mod properties;
mod expression;
mod parser;
mod comparison;
mod value;

use std::sync::Arc;

use serde_json::Value;

pub use config::PipelineConfig;
pub use context::Context;
pub use errors::{Diagnostic, DiagnosticKind, EvalError, Result};
pub use field::{FieldConfig, TooltipField};
pub use pipeline::{Pipeline, PipelineOutput};
pub use registry::{FormContext, FormField, FormFields, RenderedField, TooltipExtension};
pub use sanitize::SafeHtml;
pub use template::{evaluate, EvalOptions, Evaluation};
pub use view::{bind_id, TooltipNode, TooltipView};

/// Convenience: render one tooltip field with the default configuration.
///
/// `field` is the raw schema entry and `data` the form data; both must be
/// JSON objects or this fails with a contract violation.
pub fn render_tooltip(field: &Value, form_id: Option<&str>, data: Value) -> Result<RenderedField> {
    let mut fields = FormFields::new();
    TooltipExtension::register(&mut fields, Arc::new(Pipeline::default()));
    let form = FormContext::new(form_id.map(str::to_string), Context::from_value(data)?);
    fields.render(field, &form)
}
