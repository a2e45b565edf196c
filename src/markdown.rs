//! Markdown to HTML.
//!
//! Raw HTML in the source is never emitted as markup: inline HTML and HTML
//! blocks are turned back into text and escaped by the writer, so
//! `<script>` typed into a tooltip shows up as `&lt;script&gt;`.

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Markdown dialect switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Render single line breaks as `<br />` instead of folding them.
    pub hard_breaks: bool,
    pub strikethrough: bool,
    pub tables: bool,
    pub tasklists: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self { hard_breaks: true, strikethrough: true, tables: true, tasklists: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer {
    options: MarkdownOptions,
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    fn parser_options(&self) -> Options {
        let mut opts = Options::empty();
        if self.options.strikethrough {
            opts.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.options.tables {
            opts.insert(Options::ENABLE_TABLES);
        }
        if self.options.tasklists {
            opts.insert(Options::ENABLE_TASKLISTS);
        }
        opts
    }

    pub fn render(&self, markdown: &str) -> String {
        let hard_breaks = self.options.hard_breaks;
        let parser = Parser::new_ext(markdown, self.parser_options()).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            Event::Start(Tag::HtmlBlock) => Event::Start(Tag::Paragraph),
            Event::End(TagEnd::HtmlBlock) => Event::End(TagEnd::Paragraph),
            Event::SoftBreak if hard_breaks => Event::HardBreak,
            e => e,
        });

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        let trimmed_len = html_output.trim_end().len();
        html_output.truncate(trimmed_len);
        debug!(input = markdown.len(), output = html_output.len(), "rendered markdown");
        html_output
    }
}
