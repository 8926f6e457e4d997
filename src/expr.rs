//! `${{ ... }}` interpolation and `if:` condition evaluation.
//!
//! Workflow files reference runtime values through a small expression
//! language: context paths (`matrix.python-version`, `env.HOME`,
//! `event.ref`, `needs.build.result`), single-quoted string literals, the
//! `hashFiles()` function, the status functions (`success()`, `failure()`,
//! `always()`, `cancelled()`), comparisons with `==`/`!=`, and the boolean
//! operators `&&`, `||`, `!` with parentheses.
//!
//! A condition that fails to parse is an error, never a silent false.

use anyhow::{anyhow, bail, Context as _, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::matrix::Combination;

/// Everything an expression can observe while a job instance runs.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub matrix: Combination,
    pub env: BTreeMap<String, String>,
    pub event_name: String,
    pub event_ref: String,
    /// Job id -> conclusion string (`success`, `failure`, ...).
    pub needs: BTreeMap<String, String>,
    /// A prior step (or needed job) has failed.
    pub failed: bool,
    /// The run has been cancelled.
    pub cancelled: bool,
    /// A needed job concluded anything but success. Makes `success()`
    /// false without making `failure()` true, so a skipped dependency
    /// gates its dependents while `if: failure()` stays false.
    pub needs_unmet: bool,
    /// Root for `hashFiles()` globs.
    pub workspace: PathBuf,
}

fn interpolation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{([^}]*)\}\}").expect("valid regex"))
}

/// Replace every `${{ ... }}` occurrence in `input` with its evaluated
/// string value.
pub fn interpolate(input: &str, ctx: &EvalContext) -> Result<String> {
    let re = interpolation_re();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("capture 0");
        let inner = caps.get(1).expect("capture 1").as_str().trim();
        out.push_str(&input[last..whole.start()]);
        let value = evaluate(inner, ctx)
            .with_context(|| format!("Failed to evaluate expression '{}'", inner))?;
        out.push_str(&value.as_string());
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Evaluate an `if:` condition to a boolean.
///
/// The expression may be written with or without `${{ }}` wrapping.
pub fn evaluate_condition(expr: &str, ctx: &EvalContext) -> Result<bool> {
    let inner = strip_wrapping(expr);
    let value = evaluate(inner.trim(), ctx)
        .with_context(|| format!("Failed to evaluate condition '{}'", expr))?;
    Ok(value.truthy())
}

fn strip_wrapping(expr: &str) -> &str {
    let trimmed = expr.trim();
    if let Some(rest) = trimmed.strip_prefix("${{") {
        if let Some(inner) = rest.strip_suffix("}}") {
            return inner;
        }
    }
    trimmed
}

/// An evaluated expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty() && s != "false" && s != "0",
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

/// Evaluate a bare expression (no `${{ }}` wrapping).
pub fn evaluate(expr: &str, ctx: &EvalContext) -> Result<Value> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        ctx,
        check_only: false,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        bail!("Unexpected trailing input in expression '{}'", expr);
    }
    Ok(value)
}

/// Syntax-check an expression without evaluating it: the grammar must
/// parse, context heads and function names must be known, but no context
/// values are resolved and `hashFiles()` touches nothing.
pub fn check(expr: &str) -> Result<()> {
    let ctx = EvalContext::default();
    let tokens = lex(strip_wrapping(expr))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        ctx: &ctx,
        check_only: true,
    };
    parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        bail!("Unexpected trailing input in expression '{}'", expr);
    }
    Ok(())
}

/// Syntax-check every `${{ ... }}` occurrence in a template string.
pub fn check_template(input: &str) -> Result<()> {
    for caps in interpolation_re().captures_iter(input) {
        let inner = caps.get(1).expect("capture 1").as_str().trim();
        check(inner).with_context(|| format!("Invalid expression '{}'", inner))?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Eq,
    Ne,
}

fn lex(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' => {
                let mut lit = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        bail!("Unterminated string literal");
                    }
                    // '' is an escaped quote inside a literal
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            lit.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    lit.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Literal(lit));
            }
            '&' => {
                if i + 1 < chars.len() && chars[i + 1] == '&' {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    bail!("Expected '&&'");
                }
            }
            '|' => {
                if i + 1 < chars.len() && chars[i + 1] == '|' {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    bail!("Expected '||'");
                }
            }
            '=' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    bail!("Expected '=='");
                }
            }
            '!' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric()
                        || chars[i] == '_'
                        || chars[i] == '.'
                        || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => bail!("Unexpected character '{}' in expression", other),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a EvalContext,
    /// Validate structure and names only; resolve nothing.
    check_only: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.bump() {
            Some(t) if t == token => Ok(()),
            other => bail!("Expected {:?}, found {:?}", token, other),
        }
    }

    fn parse_or(&mut self) -> Result<Value> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            // Short-circuit value semantics: first truthy operand wins.
            if !value.truthy() {
                value = rhs;
            }
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut value = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.bump();
            let rhs = self.parse_unary()?;
            if value.truthy() {
                value = rhs;
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!value.truthy()));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Value> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.bump();
                let rhs = self.parse_primary()?;
                Ok(Value::Bool(lhs.as_string() == rhs.as_string()))
            }
            Some(Token::Ne) => {
                self.bump();
                let rhs = self.parse_primary()?;
                Ok(Value::Bool(lhs.as_string() != rhs.as_string()))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Value> {
        match self.bump() {
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Literal(s)) => Ok(Value::Str(s)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.bump();
                    let args = self.parse_args()?;
                    self.call(&name, args)
                } else {
                    self.resolve(&name)
                }
            }
            other => bail!("Expected a value, found {:?}", other),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Value>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => bail!("Expected ',' or ')' in argument list, found {:?}", other),
            }
        }
        Ok(args)
    }

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "success" => Ok(Value::Bool(
                !self.ctx.failed && !self.ctx.cancelled && !self.ctx.needs_unmet,
            )),
            "failure" => Ok(Value::Bool(self.ctx.failed)),
            "cancelled" => Ok(Value::Bool(self.ctx.cancelled)),
            "always" => Ok(Value::Bool(true)),
            "hashFiles" => {
                if self.check_only {
                    return Ok(Value::Str(String::new()));
                }
                let patterns: Vec<String> = args.iter().map(|a| a.as_string()).collect();
                Ok(Value::Str(hash_files(&self.ctx.workspace, &patterns)?))
            }
            other => bail!("Unknown function '{}'", other),
        }
    }

    /// Resolve a dotted context path.
    fn resolve(&self, path: &str) -> Result<Value> {
        if path == "true" {
            return Ok(Value::Bool(true));
        }
        if path == "false" {
            return Ok(Value::Bool(false));
        }

        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, r),
            None => bail!("Unknown value '{}' (string literals use single quotes)", path),
        };

        match head {
            "matrix" => Ok(Value::Str(
                self.ctx.matrix.get(rest).cloned().unwrap_or_default(),
            )),
            "env" => Ok(Value::Str(
                self.ctx.env.get(rest).cloned().unwrap_or_default(),
            )),
            "event" => match rest {
                "name" => Ok(Value::Str(self.ctx.event_name.clone())),
                "ref" => Ok(Value::Str(self.ctx.event_ref.clone())),
                other => bail!("Unknown event field 'event.{}'", other),
            },
            "needs" => {
                let (job, field) = rest
                    .rsplit_once('.')
                    .ok_or_else(|| anyhow!("Expected needs.<job>.result, got '{}'", path))?;
                if field != "result" {
                    bail!("Unknown needs field '{}' (only 'result' is available)", field);
                }
                if self.check_only {
                    return Ok(Value::Str(String::new()));
                }
                let result = self
                    .ctx
                    .needs
                    .get(job)
                    .ok_or_else(|| anyhow!("Job '{}' is not in this job's needs", job))?;
                Ok(Value::Str(result.clone()))
            }
            other => bail!("Unknown context '{}'", other),
        }
    }
}

/// Hash the contents of all files matching the glob patterns, relative to
/// `workspace`. Matching paths are sorted first so the digest is stable.
/// No matching files yields an empty string.
pub fn hash_files(workspace: &std::path::Path, patterns: &[String]) -> Result<String> {
    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        let full = workspace.join(pattern);
        let full_str = full.to_string_lossy().to_string();
        for entry in glob::glob(&full_str)
            .with_context(|| format!("Invalid hashFiles pattern '{}'", pattern))?
        {
            let path = entry.context("Failed to read glob entry")?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    if files.is_empty() {
        return Ok(String::new());
    }
    files.sort();
    files.dedup();

    let mut hasher = Sha256::new();
    for file in &files {
        let content = std::fs::read(file)
            .with_context(|| format!("Failed to read {} for hashFiles", file.display()))?;
        hasher.update(&content);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
