//! Query expressions over machine records
//!
//! A small subset of jq, parsed once into a typed expression tree:
//!
//! ```text
//! pipeline  := stage ('|' stage)*
//! stage     := path | 'select' '(' or ')'
//! path      := '.' | ('.' name | '.'? '[]')+
//! or        := and ('or' and)*
//! and       := test ('and' test)*
//! test      := '(' or ')' | path (op literal)?
//! op        := '==' | '!=' | '<' | '<=' | '>' | '>='
//! literal   := number | string | 'true' | 'false' | 'null'
//! ```
//!
//! Evaluation borrows from the record: the output is a list of references
//! into the input document. Missing fields evaluate to `null` and iterating
//! `null` produces nothing, so absent data yields an empty result instead of
//! an error. Indexing or iterating a scalar is a query error.

use hegel_common::{Error, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static NULL: Value = Value::Null;

/// A parsed query expression
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    stages: Vec<Stage>,
}

#[derive(Clone, Debug, PartialEq)]
enum Stage {
    Path(Path),
    Select(Predicate),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Path(Vec<Step>);

#[derive(Clone, Debug, PartialEq)]
enum Step {
    Field(String),
    Iterate,
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Truthy(Path),
    Compare { path: Path, op: CmpOp, value: Value },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Query {
    /// The identity query `.`
    #[must_use]
    pub fn identity() -> Self {
        Self {
            stages: vec![Stage::Path(Path::default())],
        }
    }

    /// Parse a query from its text form
    ///
    /// # Errors
    /// Returns `Error::InvalidFilter` describing the first syntax error.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = lex(text)?;
        let mut parser = Parser {
            text,
            tokens,
            pos: 0,
            depth: 0,
        };
        let query = parser.pipeline()?;
        if let Some((token, at)) = parser.tokens.get(parser.pos) {
            return Err(syntax(text, *at, &format!("unexpected {token}")));
        }
        Ok(query)
    }

    /// Append `next` to this query, feeding this query's output into it
    ///
    /// Adjacent path stages are fused, so `.a` then `.b` is `.a.b`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        let mut stages = self.stages.clone();
        for stage in &next.stages {
            match (stages.last_mut(), stage) {
                (Some(Stage::Path(last)), Stage::Path(path)) => {
                    last.0.extend(path.0.iter().cloned());
                }
                _ => stages.push(stage.clone()),
            }
        }
        Self { stages }
    }

    /// Evaluate against `input`, returning references into it
    ///
    /// # Errors
    /// Returns `Error::Query` when a step is applied to a value of the
    /// wrong type.
    pub fn evaluate<'v>(&self, input: &'v Value) -> Result<Vec<&'v Value>> {
        let mut current = vec![input];
        for stage in &self.stages {
            current = match stage {
                Stage::Path(path) => {
                    let mut out = Vec::with_capacity(current.len());
                    for value in current {
                        path.apply(value, &mut out)?;
                    }
                    out
                }
                Stage::Select(predicate) => {
                    let mut out = Vec::with_capacity(current.len());
                    for value in current {
                        if predicate.matches(value)? {
                            out.push(value);
                        }
                    }
                    out
                }
            };
        }
        Ok(current)
    }

    /// True if the query yields at least one non-null value on `input`
    ///
    /// Evaluation errors count as absent.
    #[must_use]
    pub fn is_present_in(&self, input: &Value) -> bool {
        self.evaluate(input)
            .is_ok_and(|values| values.iter().any(|v| !v.is_null()))
    }
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Path {
    fn apply<'v>(&self, value: &'v Value, out: &mut Vec<&'v Value>) -> Result<()> {
        walk(&self.0, value, out)
    }
}

fn walk<'v>(steps: &[Step], value: &'v Value, out: &mut Vec<&'v Value>) -> Result<()> {
    let Some((step, rest)) = steps.split_first() else {
        out.push(value);
        return Ok(());
    };

    match step {
        Step::Field(name) => match value {
            Value::Object(map) => walk(rest, map.get(name).unwrap_or(&NULL), out),
            Value::Null => walk(rest, &NULL, out),
            other => Err(Error::query(format!(
                "cannot index {} with {name:?}",
                type_name(other)
            ))),
        },
        Step::Iterate => match value {
            Value::Array(items) => items.iter().try_for_each(|item| walk(rest, item, out)),
            Value::Object(map) => map.values().try_for_each(|item| walk(rest, item, out)),
            Value::Null => Ok(()),
            other => Err(Error::query(format!(
                "cannot iterate over {}",
                type_name(other)
            ))),
        },
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Predicate {
    fn matches(&self, value: &Value) -> Result<bool> {
        match self {
            Self::Truthy(path) => {
                let mut found = Vec::new();
                path.apply(value, &mut found)?;
                Ok(found
                    .iter()
                    .any(|v| !matches!(v, Value::Null | Value::Bool(false))))
            }
            Self::Compare { path, op, value: rhs } => {
                let mut found = Vec::new();
                path.apply(value, &mut found)?;
                Ok(found.iter().any(|lhs| op.holds(lhs, rhs)))
            }
            Self::And(l, r) => Ok(l.matches(value)? && r.matches(value)?),
            Self::Or(l, r) => Ok(l.matches(value)? || r.matches(value)?),
        }
    }
}

impl CmpOp {
    fn holds(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Self::Eq => values_equal(lhs, rhs),
            Self::Ne => !values_equal(lhs, rhs),
            Self::Lt | Self::Le | Self::Gt | Self::Ge => {
                let Some(ordering) = compare(lhs, rhs) else {
                    return false;
                };
                match self {
                    Self::Lt => ordering.is_lt(),
                    Self::Le => ordering.is_le(),
                    Self::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

// 4 and 4.0 are the same number
#[allow(clippy::float_cmp)]
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// ---- Rendering ----

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match stage {
                Stage::Path(path) => write!(f, "{path}")?,
                Stage::Select(predicate) => write!(f, "select({predicate})")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for (i, step) in self.0.iter().enumerate() {
            match step {
                Step::Field(name) if is_identifier(name) => write!(f, ".{name}")?,
                Step::Field(name) => write!(f, ".{}", Value::String(name.clone()))?,
                Step::Iterate if i == 0 => f.write_str(".[]")?,
                Step::Iterate => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthy(path) => write!(f, "{path}"),
            Self::Compare { path, op, value } => write!(f, "{path} {} {value}", op.as_str()),
            Self::And(l, r) => {
                fmt_operand(l, f)?;
                f.write_str(" and ")?;
                fmt_operand(r, f)
            }
            Self::Or(l, r) => write!(f, "{l} or {r}"),
        }
    }
}

fn fmt_operand(predicate: &Predicate, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if matches!(predicate, Predicate::Or(..)) {
        write!(f, "({predicate})")
    } else {
        write!(f, "{predicate}")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---- Lexing ----

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Dot,
    Ident(String),
    Str(String),
    Number(Value),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Op(CmpOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dot => f.write_str("'.'"),
            Self::Ident(name) => write!(f, "'{name}'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Pipe => f.write_str("'|'"),
            Self::Op(op) => write!(f, "'{}'", op.as_str()),
        }
    }
}

fn syntax(text: &str, at: usize, msg: &str) -> Error {
    Error::invalid_filter(format!("{msg} at offset {at} in {text:?}"))
}

fn lex(text: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'.' => {
                i += 1;
                Token::Dot
            }
            b'[' => {
                i += 1;
                Token::LBracket
            }
            b']' => {
                i += 1;
                Token::RBracket
            }
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'|' => {
                i += 1;
                Token::Pipe
            }
            b'=' | b'!' | b'<' | b'>' => {
                let next = bytes.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    (b'=', Some(b'=')) => (CmpOp::Eq, 2),
                    (b'!', Some(b'=')) => (CmpOp::Ne, 2),
                    (b'<', Some(b'=')) => (CmpOp::Le, 2),
                    (b'>', Some(b'=')) => (CmpOp::Ge, 2),
                    (b'<', _) => (CmpOp::Lt, 1),
                    (b'>', _) => (CmpOp::Gt, 1),
                    _ => return Err(syntax(text, start, "expected comparison operator")),
                };
                i += len;
                Token::Op(op)
            }
            b'"' => {
                let (s, len) = lex_string(text, start)?;
                i += len;
                Token::Str(s)
            }
            b'-' | b'0'..=b'9' => {
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit() || matches!(bytes[i], b'.' | b'e' | b'E'))
                {
                    i += 1;
                }
                let literal = &text[start..i];
                let number = literal
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| literal.parse::<f64>().map(Value::from))
                    .map_err(|_| syntax(text, start, &format!("invalid number {literal:?}")))?;
                Token::Number(number)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                Token::Ident(text[start..i].to_string())
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or_default();
                return Err(syntax(text, start, &format!("unexpected character {ch:?}")));
            }
        };
        tokens.push((token, start));
    }

    Ok(tokens)
}

/// Lex a JSON string literal starting at `start`, returning it and its byte length
fn lex_string(text: &str, start: usize) -> Result<(String, usize)> {
    let bytes = text.as_bytes();
    let mut end = start + 1;
    while end < bytes.len() {
        match bytes[end] {
            b'\\' => end += 2,
            b'"' => {
                let literal = &text[start..=end];
                let s = serde_json::from_str::<String>(literal)
                    .map_err(|e| syntax(text, start, &format!("invalid string: {e}")))?;
                return Ok((s, end + 1 - start));
            }
            _ => end += 1,
        }
    }
    Err(syntax(text, start, "unterminated string"))
}

// ---- Parsing ----

/// Deepest parenthesised predicate the parser will descend into
const MAX_DEPTH: usize = 32;

struct Parser<'t> {
    text: &'t str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.text.len(), |(_, at)| *at)
    }

    fn error(&self, msg: &str) -> Error {
        syntax(self.text, self.offset(), msg)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected}")))
        }
    }

    /// Parse a predicate one level deeper, bounded by [`MAX_DEPTH`]
    fn nested(&mut self) -> Result<Predicate> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let predicate = self.or();
        self.depth -= 1;
        predicate
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn pipeline(&mut self) -> Result<Query> {
        let mut query = Query {
            stages: vec![self.stage()?],
        };
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let stage = Query {
                stages: vec![self.stage()?],
            };
            query = query.then(&stage);
        }
        Ok(query)
    }

    fn stage(&mut self) -> Result<Stage> {
        if self.eat_keyword("select") {
            self.expect(&Token::LParen)?;
            let predicate = self.nested()?;
            self.expect(&Token::RParen)?;
            return Ok(Stage::Select(predicate));
        }
        Ok(Stage::Path(self.path()?))
    }

    fn path(&mut self) -> Result<Path> {
        if self.peek() != Some(&Token::Dot) {
            return Err(self.error("expected path starting with '.'"));
        }

        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.peek() {
                        Some(Token::Ident(_) | Token::Str(_)) => {
                            if let Some(Token::Ident(name) | Token::Str(name)) = self.bump() {
                                steps.push(Step::Field(name));
                            }
                        }
                        Some(Token::LBracket) => {}
                        // A bare '.' is only valid as the identity
                        _ if steps.is_empty() => return Ok(Path(steps)),
                        _ => return Err(self.error("expected field name after '.'")),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.expect(&Token::RBracket)?;
                    steps.push(Step::Iterate);
                }
                _ => return Ok(Path(steps)),
            }
        }
    }

    fn or(&mut self) -> Result<Predicate> {
        let mut lhs = self.and()?;
        while self.eat_keyword("or") {
            let rhs = self.and()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Predicate> {
        let mut lhs = self.test()?;
        while self.eat_keyword("and") {
            let rhs = self.test()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn test(&mut self) -> Result<Predicate> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.nested()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let path = self.path()?;
        let Some(Token::Op(op)) = self.peek().cloned() else {
            return Ok(Predicate::Truthy(path));
        };
        self.pos += 1;
        let value = self.literal()?;
        Ok(Predicate::Compare { path, op, value })
    }

    fn literal(&mut self) -> Result<Value> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => {
                    self.pos -= 1;
                    Err(self.error(&format!("expected literal, found '{name}'")))
                }
            },
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected literal"))
            }
            None => Err(self.error("expected literal")),
        }
    }
}
