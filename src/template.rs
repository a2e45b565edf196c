//! Template evaluation: `{{ expr }}` interpolation plus `#if` / `#loop`
//! blocks, resolved against a [`Context`].
//!
//! Malformed syntax never aborts evaluation. The offending source is kept as
//! literal text and a syntax [`Diagnostic`] is attached to the result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::errors::{Diagnostic, EvalError, Result};
use crate::expression::{eval_ast, parse_expr, ENode, Env};
use crate::functions::Registry;
use crate::value::{is_truthy, to_text};

/// Per-field evaluation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalOptions {
    /// Unresolved references and failing functions abort evaluation instead
    /// of rendering as empty text.
    #[serde(default)]
    pub strict: bool,
}

impl EvalOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Text produced by a successful evaluation, with any non-fatal diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// `#if` / `#loop` blocks nest at most this deep.
const MAX_BLOCK_DEPTH: usize = 64;

#[derive(Debug, Clone)]
enum TNode {
    Text(String),
    Expr { node: ENode, src: String },
    If { cond: ENode, src: String, then_: Vec<TNode>, otherwise: Vec<TNode> },
    Loop { items: ENode, src: String, body: Vec<TNode> },
}

/// A parsed template, reusable across contexts.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<TNode>,
    diagnostics: Vec<Diagnostic>,
}

enum Frame {
    If {
        cond: ENode,
        src: String,
        then_: Vec<TNode>,
        otherwise: Vec<TNode>,
        in_else: bool,
        offset: usize,
    },
    Loop {
        items: ENode,
        src: String,
        body: Vec<TNode>,
        offset: usize,
    },
}

impl Frame {
    fn keyword(&self) -> &'static str {
        match self {
            Frame::If { .. } => "if",
            Frame::Loop { .. } => "loop",
        }
    }
}

#[derive(Default)]
struct Builder {
    root: Vec<TNode>,
    stack: Vec<Frame>,
    diagnostics: Vec<Diagnostic>,
}

impl Builder {
    fn out(&mut self) -> &mut Vec<TNode> {
        match self.stack.last_mut() {
            None => &mut self.root,
            Some(Frame::If { then_, otherwise, in_else, .. }) => {
                if *in_else {
                    otherwise
                } else {
                    then_
                }
            }
            Some(Frame::Loop { body, .. }) => body,
        }
    }

    fn push_text(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        let out = self.out();
        if let Some(TNode::Text(prev)) = out.last_mut() {
            prev.push_str(s);
        } else {
            out.push(TNode::Text(s.to_string()));
        }
    }

    fn close_top(&mut self) {
        let node = match self.stack.pop() {
            Some(Frame::If { cond, src, then_, otherwise, .. }) => {
                TNode::If { cond, src, then_, otherwise }
            }
            Some(Frame::Loop { items, src, body, .. }) => TNode::Loop { items, src, body },
            None => return,
        };
        self.out().push(node);
    }

    /// Report a malformed tag and keep its source as literal text.
    fn reject(&mut self, offset: usize, message: impl Into<String>, raw: &str) {
        self.diagnostics.push(Diagnostic::syntax(offset, message));
        self.push_text(raw);
    }

    fn tag(&mut self, raw: &str, inner: &str, inner_offset: usize, tag_offset: usize) {
        let lead = inner.len() - inner.trim_start().len();
        let trimmed = inner.trim();
        let base = inner_offset + lead;

        if let Some(rest) = trimmed.strip_prefix('#') {
            let keyword = if block_keyword(rest, "if") {
                "if"
            } else if block_keyword(rest, "loop") {
                "loop"
            } else {
                self.reject(tag_offset, format!("unknown block `#{rest}`"), raw);
                return;
            };
            if self.stack.len() >= MAX_BLOCK_DEPTH {
                self.reject(tag_offset, format!("`#{keyword}` nested too deeply"), raw);
                return;
            }
            let expr_part = &rest[keyword.len()..];
            let expr_src = expr_part.trim();
            let expr_offset = base + 1 + keyword.len() + (expr_part.len() - expr_part.trim_start().len());
            let node = match parse_expr(expr_src) {
                Ok(node) => node,
                Err(e) => {
                    let e = e.shifted(expr_offset);
                    self.reject(e.offset, format!("`#{keyword}`: {}", e.message), raw);
                    return;
                }
            };
            let src = expr_src.to_string();
            self.stack.push(match keyword {
                "if" => Frame::If {
                    cond: node,
                    src,
                    then_: Vec::new(),
                    otherwise: Vec::new(),
                    in_else: false,
                    offset: tag_offset,
                },
                _ => Frame::Loop { items: node, src, body: Vec::new(), offset: tag_offset },
            });
            return;
        }

        if trimmed == "else" {
            let open_if = matches!(self.stack.last(), Some(Frame::If { in_else: false, .. }));
            if !open_if {
                self.reject(tag_offset, "unexpected `{{else}}`", raw);
            } else if let Some(Frame::If { in_else, .. }) = self.stack.last_mut() {
                *in_else = true;
            }
            return;
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            let name = rest.trim();
            if self.stack.last().map(Frame::keyword) == Some(name) {
                self.close_top();
            } else {
                self.reject(tag_offset, format!("unexpected `{{{{/{name}}}}}`"), raw);
            }
            return;
        }

        match parse_expr(trimmed) {
            Ok(node) => self.out().push(TNode::Expr { node, src: trimmed.to_string() }),
            Err(e) => {
                let e = e.shifted(base);
                self.reject(e.offset, e.message, raw);
            }
        }
    }

    fn finish(mut self) -> Template {
        while let Some(frame) = self.stack.last() {
            let (offset, keyword) = match frame {
                Frame::If { offset, .. } | Frame::Loop { offset, .. } => (*offset, frame.keyword()),
            };
            self.diagnostics
                .push(Diagnostic::syntax(offset, format!("unclosed `{{{{#{keyword}}}}}`")));
            self.close_top();
        }
        Template { nodes: self.root, diagnostics: self.diagnostics }
    }
}

fn block_keyword(rest: &str, keyword: &str) -> bool {
    rest.strip_prefix(keyword)
        .map(|after| after.is_empty() || after.starts_with(char::is_whitespace))
        .unwrap_or(false)
}

/// Byte index of the `}}` closing a tag whose body starts at `from`. Quoted
/// strings inside the tag may contain `}}`.
fn find_close(s: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let body = &s[from..];
    for (i, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if body[i..].starts_with("}}") => return Some(from + i),
            None => {}
        }
    }
    None
}

impl Template {
    pub fn parse(src: &str) -> Self {
        let mut b = Builder::default();
        let mut pos = 0;
        while let Some(rel) = src[pos..].find("{{") {
            let open = pos + rel;
            b.push_text(&src[pos..open]);
            let inner_start = open + 2;
            match find_close(src, inner_start) {
                Some(close) => {
                    b.tag(&src[open..close + 2], &src[inner_start..close], inner_start, open);
                    pos = close + 2;
                }
                None => {
                    b.reject(open, "unterminated `{{`", &src[open..]);
                    pos = src.len();
                }
            }
        }
        b.push_text(&src[pos..]);
        b.finish()
    }

    /// Syntax problems found while parsing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn render(&self, ctx: &Context, registry: &Registry, opts: EvalOptions) -> Result<Evaluation> {
        let mut env = Env::new(ctx, registry, opts.strict);
        let mut out = Evaluation { text: String::new(), diagnostics: self.diagnostics.clone() };
        render_nodes(&self.nodes, &mut env, &mut out)?;
        Ok(out)
    }
}

fn eval_lenient(node: &ENode, src: &str, env: &Env<'_>, out: &mut Evaluation) -> Result<Option<Value>> {
    match eval_ast(node, env) {
        Ok(v) => Ok(Some(v)),
        Err(e) if env.strict => Err(e),
        Err(e) => {
            out.diagnostics.push(Diagnostic::runtime(format!("`{src}`: {e}")));
            Ok(None)
        }
    }
}

fn render_nodes(nodes: &[TNode], env: &mut Env<'_>, out: &mut Evaluation) -> Result<()> {
    for node in nodes {
        match node {
            TNode::Text(s) => out.text.push_str(s),
            TNode::Expr { node, src } => {
                if let Some(v) = eval_lenient(node, src, env, out)? {
                    out.text.push_str(&to_text(&v));
                }
            }
            TNode::If { cond, src, then_, otherwise } => {
                let taken = eval_lenient(cond, src, env, out)?
                    .map(|v| is_truthy(&v))
                    .unwrap_or(false);
                render_nodes(if taken { then_ } else { otherwise }, env, out)?;
            }
            TNode::Loop { items, src, body } => match eval_lenient(items, src, env, out)? {
                Some(Value::Array(list)) => {
                    for item in list {
                        env.frames.push(item);
                        render_nodes(body, env, out)?;
                        env.frames.pop();
                    }
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    let err = EvalError::Runtime(format!("`#loop {src}` over non-list {other}"));
                    if env.strict {
                        return Err(err);
                    }
                    out.diagnostics.push(Diagnostic::runtime(err.to_string()));
                }
            },
        }
    }
    Ok(())
}

/// Evaluates tooltip templates with a fixed function registry.
#[derive(Clone)]
pub struct TemplateEvaluator {
    registry: Registry,
}

impl Default for TemplateEvaluator {
    fn default() -> Self {
        Self::new(Registry::with_builtins())
    }
}

impl TemplateEvaluator {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Pure function of `(template, ctx, opts)`.
    pub fn evaluate(&self, template: &str, ctx: &Context, opts: EvalOptions) -> Result<Evaluation> {
        debug!(strict = opts.strict, len = template.len(), "evaluating template");
        Template::parse(template).render(ctx, &self.registry, opts)
    }
}

/// Convenience: evaluate with the built-in registry.
pub fn evaluate(template: &str, ctx: &Context, opts: EvalOptions) -> Result<Evaluation> {
    TemplateEvaluator::default().evaluate(template, ctx, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DiagnosticKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(v: Value) -> Context {
        Context::from_value(v).unwrap()
    }

    fn lenient(template: &str, data: Value) -> Evaluation {
        evaluate(template, &ctx(data), EvalOptions::default()).unwrap()
    }

    #[test]
    fn interpolation_preserves_surrounding_text() {
        let out = lenient("  Hi {{ name }},\n\tyou are {{age}}.  ", json!({"name": "Ann", "age": 30}));
        assert_eq!(out.text, "  Hi Ann,\n\tyou are 30.  ");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn if_else_blocks() {
        let t = "{{#if admin}}root{{else}}user{{/if}}";
        assert_eq!(lenient(t, json!({"admin": true})).text, "root");
        assert_eq!(lenient(t, json!({"admin": false})).text, "user");
        assert_eq!(lenient(t, json!({})).text, "user");
    }

    #[test]
    fn loops_expose_this_fields_and_parent() {
        let data = json!({
            "unit": "kg",
            "items": [{"name": "a", "w": 1}, {"name": "b", "w": 2}],
            "tags": ["x", "y"]
        });
        assert_eq!(
            lenient("{{#loop items}}- {{name}}: {{w}} {{unit}}\n{{/loop}}", data.clone()).text,
            "- a: 1 kg\n- b: 2 kg\n"
        );
        assert_eq!(lenient("{{#loop tags}}[{{this}}]{{/loop}}", data.clone()).text, "[x][y]");
        assert_eq!(
            lenient("{{#loop items}}{{parent.unit}}{{/loop}}", data).text,
            "kgkg"
        );
    }

    #[test]
    fn malformed_syntax_is_kept_and_reported_in_both_modes() {
        for opts in [EvalOptions::default(), EvalOptions::strict()] {
            let out = evaluate("a {{ upper( }} b", &ctx(json!({})), opts).unwrap();
            assert_eq!(out.text, "a {{ upper( }} b");
            assert_eq!(out.diagnostics.len(), 1);
            assert_eq!(out.diagnostics[0].kind, DiagnosticKind::Syntax);
        }
    }

    #[test]
    fn unterminated_tag_reports_its_offset() {
        let out = lenient("abc {{ name", json!({"name": "x"}));
        assert_eq!(out.text, "abc {{ name");
        assert_eq!(out.diagnostics[0].offset, Some(4));
    }

    #[test]
    fn unbalanced_blocks() {
        let out = lenient("x{{/if}}y", json!({}));
        assert_eq!(out.text, "x{{/if}}y");
        assert_eq!(out.diagnostics.len(), 1);

        let out = lenient("{{#if true}}open", json!({}));
        assert_eq!(out.text, "open");
        assert_eq!(out.diagnostics[0].message, "unclosed `{{#if}}`");
    }

    #[test]
    fn block_nesting_is_bounded() {
        let n = MAX_BLOCK_DEPTH + 2;
        let t = format!("{}x{}", "{{#if true}}".repeat(n), "{{/if}}".repeat(n));
        let out = lenient(&t, json!({}));
        assert_eq!(out.diagnostics.len(), 4);
        assert!(out.diagnostics.iter().all(|d| d.kind == DiagnosticKind::Syntax));
        assert_eq!(out.diagnostics[0].message, "`#if` nested too deeply");
        assert_eq!(out.text, "{{#if true}}{{#if true}}x{{/if}}{{/if}}");
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_tag() {
        assert_eq!(lenient("{{ 'a}}b' }}", json!({})).text, "a}}b");
    }

    #[test]
    fn strict_mode_fails_on_unresolved() {
        let err = evaluate("{{missing}}", &Context::new(), EvalOptions::strict()).unwrap_err();
        assert_eq!(err, EvalError::Unresolved("missing".into()));
        assert_eq!(lenient("[{{missing}}]", json!({})).text, "[]");
    }

    #[test]
    fn lenient_runtime_errors_become_diagnostics() {
        let out = lenient("a{{ nope(1) }}b", json!({}));
        assert_eq!(out.text, "ab");
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::Runtime);

        let err = evaluate("{{ nope(1) }}", &Context::new(), EvalOptions::strict()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(_)));
    }

    #[test]
    fn looping_over_a_scalar() {
        let out = lenient("{{#loop n}}x{{/loop}}", json!({"n": 3}));
        assert_eq!(out.text, "");
        assert_eq!(out.diagnostics.len(), 1);
        let err = evaluate("{{#loop n}}x{{/loop}}", &ctx(json!({"n": 3})), EvalOptions::strict());
        assert!(err.is_err());
    }
}
