use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::context::Context;
use crate::errors::Diagnostic;
use crate::functions::Registry;
use crate::markdown::MarkdownRenderer;
use crate::sanitize::{HtmlSanitizer, SafeHtml};
use crate::template::{EvalOptions, TemplateEvaluator};

/// Result of one pass through evaluate, render and sanitize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub content: SafeHtml,
    /// Strict evaluation failed; `content` holds the fallback.
    pub failed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The text-to-safe-HTML pipeline. Stateless and shareable across fields.
#[derive(Clone, Default)]
pub struct Pipeline {
    evaluator: TemplateEvaluator,
    renderer: MarkdownRenderer,
    sanitizer: HtmlSanitizer,
    debug: bool,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_registry(config, Registry::with_builtins())
    }

    pub fn with_registry(config: &PipelineConfig, registry: Registry) -> Self {
        Self {
            evaluator: TemplateEvaluator::new(registry),
            renderer: MarkdownRenderer::new(config.markdown),
            sanitizer: HtmlSanitizer::new(config.sanitizer.clone())
                .with_task_checkboxes(config.markdown.tasklists),
            debug: config.debug,
        }
    }

    pub fn evaluator(&self) -> &TemplateEvaluator {
        &self.evaluator
    }

    pub fn renderer(&self) -> &MarkdownRenderer {
        &self.renderer
    }

    pub fn sanitizer(&self) -> &HtmlSanitizer {
        &self.sanitizer
    }

    /// Markdown to safe HTML, skipping evaluation.
    pub fn render_markdown(&self, markdown: &str) -> SafeHtml {
        self.sanitizer.sanitize(&self.renderer.render(markdown))
    }

    /// Run evaluate, render, sanitize in that order. Never fails: evaluation
    /// errors become a diagnostic plus an empty (or, in debug mode, an
    /// explanatory) fallback.
    pub fn run(&self, template: &str, ctx: &Context, options: EvalOptions) -> PipelineOutput {
        match self.evaluator.evaluate(template, ctx, options) {
            Ok(evaluation) => {
                for d in &evaluation.diagnostics {
                    warn!(diagnostic = %d, "template diagnostic");
                }
                let content = self.render_markdown(&evaluation.text);
                debug!(len = content.as_str().len(), "pipeline finished");
                PipelineOutput { content, failed: false, diagnostics: evaluation.diagnostics }
            }
            Err(err) => {
                warn!(error = %err, "template evaluation failed");
                let content = if self.debug {
                    self.render_markdown(&err.to_string())
                } else {
                    SafeHtml::default()
                };
                PipelineOutput { content, failed: true, diagnostics: vec![Diagnostic::from_error(&err)] }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DiagnosticKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn strict_failure_falls_back_to_empty() {
        let out = Pipeline::default().run("**{{missing}}**", &Context::new(), EvalOptions::strict());
        assert!(out.failed);
        assert!(out.content.is_empty());
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::Evaluation);
    }

    #[test]
    fn debug_mode_shows_the_error() {
        let cfg = PipelineConfig { debug: true, ..Default::default() };
        let out = Pipeline::new(&cfg).run("{{missing}}", &Context::new(), EvalOptions::strict());
        assert!(out.failed);
        assert_eq!(out.content.as_str(), "<p>unresolved reference: missing</p>");
    }

    #[test]
    fn lenient_run_renders_markdown() {
        let ctx = Context::from_value(json!({"items": ["a", "b"]})).unwrap();
        let out = Pipeline::default().run("{{#loop items}}- {{this}}\n{{/loop}}", &ctx, EvalOptions::default());
        assert!(!out.failed);
        assert_eq!(out.content.as_str(), "<ul>\n<li>a</li>\n<li>b</li>\n</ul>");
    }

    #[test]
    fn task_lists_only_keep_inert_checkboxes() {
        let ctx = Context::new();
        let plain = Pipeline::default().run("- [x] done", &ctx, EvalOptions::default());
        assert!(!plain.content.as_str().contains("<input"));

        let mut cfg = PipelineConfig::default();
        cfg.markdown.tasklists = true;
        let out = Pipeline::new(&cfg).run("- [x] done", &ctx, EvalOptions::default());
        let html = out.content.as_str();
        assert!(html.contains(r#"type="checkbox""#), "{html}");
        assert!(html.contains(r#"disabled="""#), "{html}");
    }
}
