// src/expression.rs
use std::cmp::Ordering;

use itertools::Itertools;
use serde_json::Value;

use crate::comparison::{compare, loose_eq};
use crate::context::Context;
use crate::errors::{EvalError, Result};
use crate::functions::Registry;
use crate::parser::{ParseError, Parser};
use crate::value::is_truthy;

#[derive(Debug, Clone, PartialEq)]
pub enum ENode {
    Literal(Value),
    Path(Vec<PathSeg>),
    Call { name: String, args: Vec<ENode> },
    Compare { op: CmpOp, lhs: Box<ENode>, rhs: Box<ENode> },
    /// Operands of a flat `a and b and ...` chain.
    And(Vec<ENode>),
    Or(Vec<ENode>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parentheses and call arguments nest at most this deep.
const MAX_DEPTH: usize = 64;

/// Parse a complete expression; trailing input is an error.
pub fn parse_expr(input: &str) -> std::result::Result<ENode, ParseError> {
    let mut p = EParser::new(input);
    let node = p.parse_or()?;
    p.parser.skip_ws();
    if !p.parser.eof() {
        return Err(p.parser.error("trailing input"));
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            parser: Parser::new(s),
            depth: 0,
        }
    }

    /// Parse a nested sub-expression (parenthesized or a call argument).
    fn parse_nested(&mut self) -> std::result::Result<ENode, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.parser.error("expression nested too deeply"));
        }
        self.depth += 1;
        let node = self.parse_or();
        self.depth -= 1;
        node
    }

    fn parse_or(&mut self) -> std::result::Result<ENode, ParseError> {
        let mut operands = vec![self.parse_and()?];
        loop {
            self.parser.skip_ws();
            if !self.parser.consume_keyword("or") {
                break;
            }
            operands.push(self.parse_and()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { ENode::Or(operands) })
    }

    fn parse_and(&mut self) -> std::result::Result<ENode, ParseError> {
        let mut operands = vec![self.parse_comparison()?];
        loop {
            self.parser.skip_ws();
            if !self.parser.consume_keyword("and") {
                break;
            }
            operands.push(self.parse_comparison()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { ENode::And(operands) })
    }

    fn parse_comparison(&mut self) -> std::result::Result<ENode, ParseError> {
        let lhs = self.parse_primary()?;
        self.parser.skip_ws();
        let op = if self.parser.consume_str("==") {
            CmpOp::Eq
        } else if self.parser.consume_str("!=") {
            CmpOp::Ne
        } else if self.parser.consume_str("<=") {
            CmpOp::Le
        } else if self.parser.consume_str(">=") {
            CmpOp::Ge
        } else if self.parser.consume_char('=') {
            CmpOp::Eq
        } else if self.parser.consume_char('<') {
            CmpOp::Lt
        } else if self.parser.consume_char('>') {
            CmpOp::Gt
        } else {
            return Ok(lhs);
        };
        let rhs = self.parse_primary()?;
        Ok(ENode::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn parse_primary(&mut self) -> std::result::Result<ENode, ParseError> {
        self.parser.skip_ws();
        match self.parser.peek_char() {
            Some('(') => {
                self.parser.consume_char('(');
                let inner = self.parse_nested()?;
                self.parser.skip_ws();
                self.parser.expect(')')?;
                Ok(inner)
            }
            Some('"') | Some('\'') => Ok(ENode::Literal(Value::String(
                self.parser.parse_quoted_string()?,
            ))),
            Some(c) if c.is_ascii_digit() || c == '-' => {
                Ok(ENode::Literal(self.parser.parse_number_literal()?))
            }
            Some(_) => self.parse_name(),
            None => Err(self.parser.error("expression expected")),
        }
    }

    fn parse_name(&mut self) -> std::result::Result<ENode, ParseError> {
        let name = self.parser.parse_identifier()?;
        self.parser.skip_ws();
        if self.parser.consume_char('(') {
            let args = self.parse_args()?;
            self.parser.expect(')')?;
            return Ok(ENode::Call { name, args });
        }
        match name.as_str() {
            "true" => return Ok(ENode::Literal(Value::Bool(true))),
            "false" => return Ok(ENode::Literal(Value::Bool(false))),
            "null" => return Ok(ENode::Literal(Value::Null)),
            _ => {}
        }
        let mut segs = vec![PathSeg::Key(name)];
        loop {
            if self.parser.consume_char('.') {
                segs.push(PathSeg::Key(self.parser.parse_identifier()?));
            } else if self.parser.consume_char('[') {
                self.parser.skip_ws();
                let idx = self.parser.parse_index()?;
                self.parser.skip_ws();
                self.parser.expect(']')?;
                segs.push(PathSeg::Index(idx));
            } else {
                return Ok(ENode::Path(segs));
            }
        }
    }

    fn parse_args(&mut self) -> std::result::Result<Vec<ENode>, ParseError> {
        let mut out = Vec::new();
        self.parser.skip_ws();
        if self.parser.peek_char() == Some(')') {
            return Ok(out);
        }
        loop {
            out.push(self.parse_nested()?);
            self.parser.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            break;
        }
        Ok(out)
    }
}

/// Everything an expression can see while it is evaluated.
pub struct Env<'a> {
    pub ctx: &'a Context,
    pub registry: &'a Registry,
    pub strict: bool,
    /// Loop items, innermost last.
    pub frames: Vec<Value>,
}

impl<'a> Env<'a> {
    pub fn new(ctx: &'a Context, registry: &'a Registry, strict: bool) -> Self {
        Self { ctx, registry, strict, frames: Vec::new() }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "this" => {
                return Some(self.frames.last().cloned().unwrap_or_else(|| self.ctx.root()));
            }
            "parent" => {
                return match self.frames.len() {
                    0 => None,
                    1 => Some(self.ctx.root()),
                    n => Some(self.frames[n - 2].clone()),
                };
            }
            _ => {}
        }
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).cloned())
            .or_else(|| self.ctx.get(name).cloned())
    }
}

fn path_to_string(segs: &[PathSeg]) -> String {
    segs.iter()
        .enumerate()
        .map(|(i, seg)| match seg {
            PathSeg::Key(k) if i == 0 => k.clone(),
            PathSeg::Key(k) => format!(".{k}"),
            PathSeg::Index(n) => format!("[{n}]"),
        })
        .join("")
}

fn resolve(env: &Env<'_>, segs: &[PathSeg]) -> Option<Value> {
    let (head, rest) = segs.split_first()?;
    let mut cur = match head {
        PathSeg::Key(k) => env.lookup(k)?,
        PathSeg::Index(_) => return None,
    };
    for seg in rest {
        cur = match seg {
            PathSeg::Key(k) => cur.get(k.as_str())?.clone(),
            PathSeg::Index(i) => cur.get(*i)?.clone(),
        };
    }
    Some(cur)
}

/// Evaluate an expression node. Unresolved paths are an error in strict mode
/// and null otherwise.
pub fn eval_ast(node: &ENode, env: &Env<'_>) -> Result<Value> {
    match node {
        ENode::Literal(v) => Ok(v.clone()),
        ENode::Path(segs) => match resolve(env, segs) {
            Some(v) => Ok(v),
            None if env.strict => Err(EvalError::Unresolved(path_to_string(segs))),
            None => Ok(Value::Null),
        },
        ENode::Call { name, args } => {
            let values = args
                .iter()
                .map(|a| eval_ast(a, env))
                .collect::<Result<Vec<_>>>()?;
            env.registry.call(name, &values)
        }
        ENode::Compare { op, lhs, rhs } => {
            let a = eval_ast(lhs, env)?;
            let b = eval_ast(rhs, env)?;
            let out = match op {
                CmpOp::Eq => loose_eq(&a, &b),
                CmpOp::Ne => !loose_eq(&a, &b),
                CmpOp::Lt => compare(&a, &b) == Some(Ordering::Less),
                CmpOp::Le => matches!(compare(&a, &b), Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => compare(&a, &b) == Some(Ordering::Greater),
                CmpOp::Ge => matches!(compare(&a, &b), Some(Ordering::Greater | Ordering::Equal)),
            };
            Ok(Value::Bool(out))
        }
        ENode::And(operands) => {
            for operand in operands {
                if !is_truthy(&eval_ast(operand, env)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        ENode::Or(operands) => {
            for operand in operands {
                if is_truthy(&eval_ast(operand, env)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval_with(expr: &str, data: Value, strict: bool) -> Result<Value> {
        let ctx = Context::from_value(data)?;
        let registry = Registry::with_builtins();
        let env = Env::new(&ctx, &registry, strict);
        let ast = parse_expr(expr).map_err(EvalError::from)?;
        eval_ast(&ast, &env)
    }

    #[test]
    fn parses_paths_calls_and_operators() {
        let ast = parse_expr("upper(user.names[1]) = 'B' and not(flag)").unwrap();
        assert!(matches!(ast, ENode::And(ref ops) if ops.len() == 2));
        assert_eq!(
            parse_expr("a.b[2]").unwrap(),
            ENode::Path(vec![
                PathSeg::Key("a".into()),
                PathSeg::Key("b".into()),
                PathSeg::Index(2)
            ])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_expr("upper(name").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("").is_err());
        assert!(parse_expr("a[x]").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let ok = format!("{}x{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse_expr(&ok).is_ok());
        let deep = format!("{}x{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        let err = parse_expr(&deep).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");
        assert_eq!(err.offset, MAX_DEPTH + 1);
        assert!(parse_expr(&"lower(".repeat(5_000)).is_err());
    }

    #[test]
    fn long_chains_stay_flat() {
        let chain = vec!["false"; 5_000].join(" or ");
        match parse_expr(&chain).unwrap() {
            ENode::Or(ops) => assert_eq!(ops.len(), 5_000),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(eval_with(&format!("{chain} or true"), json!({}), true).unwrap(), json!(true));
    }

    #[test]
    fn evaluates_against_data() {
        let data = json!({"user": {"names": ["a", "b"]}, "age": 17, "flag": false});
        assert_eq!(
            eval_with("upper(user.names[1]) = 'B' and not(flag)", data.clone(), true).unwrap(),
            json!(true)
        );
        assert_eq!(eval_with("age >= 18 or flag", data.clone(), true).unwrap(), json!(false));
        assert_eq!(eval_with("(age < 18)", data, true).unwrap(), json!(true));
    }

    #[test]
    fn unresolved_paths_depend_on_strictness() {
        assert_eq!(
            eval_with("user.missing", json!({"user": {}}), true).unwrap_err(),
            EvalError::Unresolved("user.missing".into())
        );
        assert_eq!(eval_with("user.missing", json!({"user": {}}), false).unwrap(), Value::Null);
        assert_eq!(
            eval_with("or_default(nope, 'fallback')", json!({}), false).unwrap(),
            json!("fallback")
        );
    }
}
