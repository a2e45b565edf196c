use std::sync::Arc;

use crate::context::Context;
use crate::errors::Diagnostic;
use crate::field::TooltipField;
use crate::memo::Memo;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::sanitize::SafeHtml;

/// Info icon shown next to the label; the text panel is bound to it.
pub const INFO_ICON_SVG: &str = concat!(
    r#"<svg width="20" height="20" viewBox="0 0 20 20" fill="none" xmlns="http://www.w3.org/2000/svg">"#,
    r#"<rect width="20" height="20" fill="white" fill-opacity="0.01" style="mix-blend-mode:multiply"/>"#,
    r#"<path d="M10 3.75C8.76387 3.75 7.5555 4.11656 6.52769 4.80331C5.49988 5.49007 4.6988 6.46619 "#,
    r#"4.22576 7.60823C3.75271 8.75027 3.62894 10.0069 3.87009 11.2193C4.11125 12.4317 4.70651 13.5453 "#,
    r#"5.58058 14.4194C6.45466 15.2935 7.56831 15.8887 8.78069 16.1299C9.99307 16.3711 11.2497 16.2473 "#,
    r#"12.3918 15.7742C13.5338 15.3012 14.5099 14.5001 15.1967 13.4723C15.8834 12.4445 16.25 11.2361 "#,
    r#"16.25 10C16.25 8.3424 15.5915 6.75268 14.4194 5.58058C13.2473 4.40848 11.6576 3.75 10 3.75ZM10 "#,
    r#"6.42857C10.1324 6.42857 10.2619 6.46784 10.372 6.54143C10.4822 6.61501 10.568 6.71959 10.6187 "#,
    r#"6.84195C10.6694 6.96431 10.6826 7.09896 10.6568 7.22885C10.6309 7.35875 10.5672 7.47807 10.4735 "#,
    r#"7.57172C10.3799 7.66537 10.2605 7.72915 10.1306 7.75499C10.0007 7.78083 9.8661 7.76757 9.74374 "#,
    r#"7.71688C9.62138 7.6662 9.5168 7.58037 9.44321 7.47025C9.36963 7.36012 9.33036 7.23066 9.33036 "#,
    r#"7.09821C9.33036 6.92061 9.40091 6.75029 9.52649 6.6247C9.65207 6.49912 9.8224 6.42857 10 "#,
    r#"6.42857ZM11.7857 13.6272H8.21429V12.6228H9.49777V10.0558H8.66072V9.05134H10.5022V12.6228H11.7857V13.6272Z" "#,
    r##"fill="#161616"/></svg>"##,
);

/// Identifier shared by the icon and the text panel of one tooltip.
///
/// An empty form id counts as absent.
pub fn bind_id(form_id: Option<&str>, field_id: &str) -> String {
    match form_id.filter(|f| !f.is_empty()) {
        Some(form_id) => format!("fjs-form-{form_id}-{field_id}"),
        None => format!("fjs-form-{field_id}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Ready,
    /// Strict evaluation failed; the panel shows the fallback.
    Failed,
}

/// Output of one tooltip render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TooltipNode {
    pub binding_id: String,
    pub content: SafeHtml,
    pub state: ContentState,
    pub diagnostics: Vec<Diagnostic>,
}

impl TooltipNode {
    pub fn new(binding_id: String, output: PipelineOutput) -> Self {
        Self {
            binding_id,
            content: output.content,
            state: if output.failed { ContentState::Failed } else { ContentState::Ready },
            diagnostics: output.diagnostics,
        }
    }

    /// Container markup: the icon carries `data-tooltip-id`, the text panel
    /// carries the same value as its `id`.
    pub fn to_html(&self) -> String {
        let id = escape_attr(&self.binding_id);
        let text_class = match self.state {
            ContentState::Ready => "fjs-tooltip-text",
            ContentState::Failed => "fjs-tooltip-text fjs-tooltip-error",
        };
        let mut out = String::with_capacity(INFO_ICON_SVG.len() + self.content.as_str().len() + 256);
        out.push_str(r#"<div class="fjs-tooltip-container">"#);
        out.push_str(&format!(r#"<div class="fjs-tooltip-icon info-icon" data-tooltip-id="{id}">"#));
        out.push_str(INFO_ICON_SVG);
        out.push_str("</div>");
        out.push_str(&format!(r#"<div class="{text_class}" id="{id}">"#));
        out.push_str(self.content.as_str());
        out.push_str("</div></div>");
        out
    }
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A mounted tooltip. Re-rendering with unchanged inputs reuses the last
/// pipeline output.
pub struct TooltipView {
    pipeline: Arc<Pipeline>,
    memo: Memo<PipelineOutput>,
}

impl TooltipView {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline, memo: Memo::new() }
    }

    pub fn render(&mut self, field: &TooltipField, form_id: Option<&str>, ctx: &Context) -> TooltipNode {
        let pipeline = &self.pipeline;
        let output = self
            .memo
            .get_or_compute(&field.text, ctx, field.options(), || {
                pipeline.run(&field.text, ctx, field.options())
            });
        TooltipNode::new(bind_id(form_id, &field.id), output)
    }

    /// `(hits, misses)` of the render cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.memo.stats()
    }
}
