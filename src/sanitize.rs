//! Allow-list HTML sanitizer on top of `ammonia`.
//!
//! [`SafeHtml`] can only be produced here, so anything mounted into a
//! tooltip has been through [`HtmlSanitizer::sanitize`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use ammonia::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Everything the Markdown renderer emits, plus `span`.
const TEXT_TAGS: &[&str] = &[
    "p", "br", "hr", "span", "strong", "em", "del", "code", "pre", "blockquote", "ul", "ol",
    "li", "a", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead", "tbody", "tr", "th", "td",
];

/// Re-cleaning a clean document normally settles after one pass.
const MAX_PASSES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerOptions {
    /// Schemes permitted in `href` and `src`; relative URLs always pass.
    pub url_schemes: Vec<String>,
    pub allow_images: bool,
}

impl Default for SanitizerOptions {
    fn default() -> Self {
        Self {
            url_schemes: ["http", "https", "mailto", "tel"].map(String::from).to_vec(),
            allow_images: true,
        }
    }
}

/// HTML that went through the sanitizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HtmlSanitizer {
    options: SanitizerOptions,
    task_checkboxes: bool,
}

impl HtmlSanitizer {
    pub fn new(options: SanitizerOptions) -> Self {
        Self { options, task_checkboxes: false }
    }

    /// Keep `<input>` for Markdown task lists. Whatever the source says, the
    /// element comes out as a disabled checkbox.
    pub fn with_task_checkboxes(mut self, enabled: bool) -> Self {
        self.task_checkboxes = enabled;
        self
    }

    fn builder(&self) -> Builder<'_> {
        let mut tags: HashSet<&str> = TEXT_TAGS.iter().copied().collect();
        let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
        tag_attributes.insert("a", ["href", "title"].into_iter().collect());
        tag_attributes.insert("code", ["class"].into_iter().collect());
        tag_attributes.insert("th", ["align"].into_iter().collect());
        tag_attributes.insert("td", ["align"].into_iter().collect());
        tag_attributes.insert("ol", ["start"].into_iter().collect());
        if self.options.allow_images {
            tags.insert("img");
            tag_attributes.insert("img", ["src", "alt", "title", "width", "height"].into_iter().collect());
        }

        if self.task_checkboxes {
            tags.insert("input");
            tag_attributes.insert("input", ["checked"].into_iter().collect());
        }

        let mut b = Builder::default();
        if self.task_checkboxes {
            b.set_tag_attribute_value("input", "type", "checkbox")
                .set_tag_attribute_value("input", "disabled", "");
        }
        b.tags(tags)
            .tag_attributes(tag_attributes)
            .generic_attributes(HashSet::new())
            .url_schemes(self.options.url_schemes.iter().map(String::as_str).collect())
            .clean_content_tags(["script", "style", "iframe", "object", "template"].into_iter().collect())
            .link_rel(Some("noopener noreferrer"))
            .strip_comments(true);
        b
    }

    /// Strip everything not on the allow-list. Idempotent: the result is a
    /// fixpoint of the cleaner, or empty when no fixpoint is reached.
    pub fn sanitize(&self, html: &str) -> SafeHtml {
        let builder = self.builder();
        let mut current = builder.clean(html).to_string();
        for _ in 0..MAX_PASSES {
            let next = builder.clean(&current).to_string();
            if next == current {
                debug!(input = html.len(), output = current.len(), "sanitized html");
                return SafeHtml(current);
            }
            current = next;
        }
        warn!(input = html.len(), "sanitizer did not settle, dropping content");
        SafeHtml::default()
    }
}
