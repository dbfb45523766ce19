//! Rendering conditions: a small boolean language over form values.
//!
//! ```text
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := unary (("&&" | "and") unary)*
//! unary      := ("!" | "not") unary | "(" expr ")" | comparison
//! comparison := operand (("==" | "===" | "!=" | "!==") operand
//!                       | "in" operand | "not in" operand)?
//! operand    := path | 'string' | "string" | number | true | false | null | list
//! list       := "[" (operand ("," operand)*)? "]"
//! ```
//!
//! Only comparison, membership and boolean connectives exist. There is no
//! arithmetic and no function call.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::values::{ValueMap, is_empty, lookup, loose_eq};

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("string starting at offset {0} is not terminated")]
    UnterminatedString(usize),
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("expression ended unexpectedly")]
    UnexpectedEnd,
    #[error("expression nests deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Right or left hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(Value),
    List(Vec<Operand>),
}

/// Parsed rendering condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Truthy(Operand),
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    In(Operand, Operand),
    NotIn(Operand, Operand),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn parse(expression: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };
        let condition = parser.parse_or()?;
        match parser.peek() {
            None => Ok(condition),
            Some(token) => Err(ConditionError::UnexpectedToken {
                found: token.kind.to_string(),
                offset: token.offset,
            }),
        }
    }

    pub fn evaluate(&self, values: &ValueMap) -> bool {
        match self {
            Condition::Truthy(operand) => !is_empty(&operand.resolve(values)),
            Condition::Eq(left, right) => loose_eq(&left.resolve(values), &right.resolve(values)),
            Condition::Ne(left, right) => !loose_eq(&left.resolve(values), &right.resolve(values)),
            Condition::In(needle, haystack) => {
                contains(&haystack.resolve(values), &needle.resolve(values))
            }
            Condition::NotIn(needle, haystack) => {
                !contains(&haystack.resolve(values), &needle.resolve(values))
            }
            Condition::Not(inner) => !inner.evaluate(values),
            Condition::And(conditions) => conditions.iter().all(|c| c.evaluate(values)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.evaluate(values)),
        }
    }

    /// Field paths the condition reads, in first-seen order.
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Condition::Truthy(operand) => operand.collect_references(out),
            Condition::Eq(left, right)
            | Condition::Ne(left, right)
            | Condition::In(left, right)
            | Condition::NotIn(left, right) => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Condition::Not(inner) => inner.collect_references(out),
            Condition::And(conditions) | Condition::Or(conditions) => {
                for condition in conditions {
                    condition.collect_references(out);
                }
            }
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Condition::parse(expression)
    }
}

impl Operand {
    fn resolve<'a>(&'a self, values: &'a ValueMap) -> Cow<'a, Value> {
        match self {
            Operand::Field(path) => lookup(values, path)
                .map(Cow::Borrowed)
                .unwrap_or(Cow::Owned(Value::Null)),
            Operand::Literal(value) => Cow::Borrowed(value),
            Operand::List(items) => Cow::Owned(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(values).into_owned())
                    .collect(),
            )),
        }
    }

    fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Operand::Field(path) => {
                if !out.contains(path) {
                    out.push(path.clone());
                }
            }
            Operand::Literal(_) => {}
            Operand::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
        }
    }
}

/// Membership: array element, substring, or any overlap when the needle is
/// itself a list (e.g. a multi-checkbox value).
fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Array(items), Value::Array(wanted)) => wanted
            .iter()
            .any(|want| items.iter().any(|item| loose_eq(item, want))),
        (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
        (Value::String(text), Value::String(part)) => !part.is_empty() && text.contains(part.as_str()),
        _ => false,
    }
}

/// Evaluates `expression` against `values`, failing closed.
///
/// Any expression that does not parse yields `false`, so a bad condition
/// hides its field instead of breaking the form.
pub fn evaluate_condition(expression: &str, values: &ValueMap) -> bool {
    match Condition::parse(expression) {
        Ok(condition) => condition.evaluate(values),
        Err(err) => {
            tracing::debug!(expression, error = %err, "rendering condition rejected");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Num(Number),
    True,
    False,
    Null,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Str(text) => write!(f, "string '{}'", text),
            TokenKind::Num(number) => write!(f, "number {}", number),
            TokenKind::True => f.write_str("'true'"),
            TokenKind::False => f.write_str("'false'"),
            TokenKind::Null => f.write_str("'null'"),
            TokenKind::EqEq => f.write_str("'=='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::AndAnd => f.write_str("'&&'"),
            TokenKind::OrOr => f.write_str("'||'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::And => f.write_str("'and'"),
            TokenKind::Or => f.write_str("'or'"),
            TokenKind::Not => f.write_str("'not'"),
            TokenKind::In => f.write_str("'in'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let push = |tokens: &mut Vec<Token>, kind| tokens.push(Token { kind, offset });

        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                push(&mut tokens, TokenKind::LParen);
                i += 1;
            }
            ')' => {
                push(&mut tokens, TokenKind::RParen);
                i += 1;
            }
            '[' => {
                push(&mut tokens, TokenKind::LBracket);
                i += 1;
            }
            ']' => {
                push(&mut tokens, TokenKind::RBracket);
                i += 1;
            }
            ',' => {
                push(&mut tokens, TokenKind::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                push(&mut tokens, TokenKind::EqEq);
                i += 2;
                if chars.get(i).map(|(_, c)| *c) == Some('=') {
                    i += 1;
                }
            }
            '!' if next == Some('=') => {
                push(&mut tokens, TokenKind::NotEq);
                i += 2;
                if chars.get(i).map(|(_, c)| *c) == Some('=') {
                    i += 1;
                }
            }
            '!' => {
                push(&mut tokens, TokenKind::Bang);
                i += 1;
            }
            '&' if next == Some('&') => {
                push(&mut tokens, TokenKind::AndAnd);
                i += 2;
            }
            '|' if next == Some('|') => {
                push(&mut tokens, TokenKind::OrOr);
                i += 2;
            }
            '\'' | '"' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let c = chars[j].1;
                    if c == '\\' {
                        if let Some((_, escaped)) = chars.get(j + 1) {
                            text.push(*escaped);
                            j += 2;
                            continue;
                        }
                        break;
                    }
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                    j += 1;
                }
                if !closed {
                    return Err(ConditionError::UnterminatedString(offset));
                }
                push(&mut tokens, TokenKind::Str(text));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(o, _)| *o).unwrap_or(input.len());
                let literal = &input[offset..end];
                let number = parse_number(literal).ok_or(ConditionError::UnexpectedChar {
                    ch: c,
                    offset,
                })?;
                push(&mut tokens, TokenKind::Num(number));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut j = i + 1;
                while j < chars.len() {
                    let c = chars[j].1;
                    if c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '-') {
                        j += 1;
                    } else if c == '[' {
                        // Only `[digits]` continues a path; anything else is a list.
                        let mut k = j + 1;
                        while k < chars.len() && chars[k].1.is_ascii_digit() {
                            k += 1;
                        }
                        if k > j + 1 && chars.get(k).map(|(_, c)| *c) == Some(']') {
                            j = k + 1;
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                let end = chars.get(j).map(|(o, _)| *o).unwrap_or(input.len());
                let word = &input[offset..end];
                let kind = match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" | "undefined" => TokenKind::Null,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "in" => TokenKind::In,
                    _ => TokenKind::Ident(word.to_string()),
                };
                push(&mut tokens, kind);
                i = j;
            }
            other => return Err(ConditionError::UnexpectedChar { ch: other, offset }),
        }
    }

    Ok(tokens)
}

fn parse_number(literal: &str) -> Option<Number> {
    if let Ok(integer) = literal.parse::<i64>() {
        return Some(Number::from(integer));
    }
    literal
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), ConditionError> {
        match self.advance() {
            Some(token) if token.kind == expected => Ok(()),
            Some(token) => Err(unexpected(&token)),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err(ConditionError::TooDeep)
        } else {
            Ok(())
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut terms = vec![self.parse_and()?];
        while matches!(self.peek_kind(), Some(TokenKind::OrOr | TokenKind::Or)) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut terms = vec![self.parse_unary()?];
        while matches!(self.peek_kind(), Some(TokenKind::AndAnd | TokenKind::And)) {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Condition, ConditionError> {
        self.descend()?;
        let condition = match self.peek_kind() {
            Some(TokenKind::Bang | TokenKind::Not) => {
                self.advance();
                Condition::Not(Box::new(self.parse_unary()?))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen)?;
                inner
            }
            _ => self.parse_comparison()?,
        };
        self.depth -= 1;
        Ok(condition)
    }

    fn parse_comparison(&mut self) -> Result<Condition, ConditionError> {
        let left = self.parse_operand()?;
        let condition = match self.peek_kind() {
            Some(TokenKind::EqEq) => {
                self.advance();
                Condition::Eq(left, self.parse_operand()?)
            }
            Some(TokenKind::NotEq) => {
                self.advance();
                Condition::Ne(left, self.parse_operand()?)
            }
            Some(TokenKind::In) => {
                self.advance();
                Condition::In(left, self.parse_operand()?)
            }
            Some(TokenKind::Not)
                if matches!(
                    self.tokens.get(self.position + 1).map(|t| &t.kind),
                    Some(TokenKind::In)
                ) =>
            {
                self.position += 2;
                Condition::NotIn(left, self.parse_operand()?)
            }
            _ => Condition::Truthy(left),
        };
        Ok(condition)
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        let token = self.advance().ok_or(ConditionError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Ident(path) => Ok(Operand::Field(path)),
            TokenKind::Str(text) => Ok(Operand::Literal(Value::String(text))),
            TokenKind::Num(number) => Ok(Operand::Literal(Value::Number(number))),
            TokenKind::True => Ok(Operand::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Operand::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Operand::Literal(Value::Null)),
            TokenKind::LBracket => {
                self.descend()?;
                let mut items = Vec::new();
                if matches!(self.peek_kind(), Some(TokenKind::RBracket)) {
                    self.advance();
                } else {
                    loop {
                        items.push(self.parse_operand()?);
                        match self.advance() {
                            Some(Token {
                                kind: TokenKind::Comma,
                                ..
                            }) => continue,
                            Some(Token {
                                kind: TokenKind::RBracket,
                                ..
                            }) => break,
                            Some(other) => return Err(unexpected(&other)),
                            None => return Err(ConditionError::UnexpectedEnd),
                        }
                    }
                }
                self.depth -= 1;
                Ok(Operand::List(items))
            }
            _ => Err(unexpected(&token)),
        }
    }
}

fn unexpected(token: &Token) -> ConditionError {
    ConditionError::UnexpectedToken {
        found: token.kind.to_string(),
        offset: token.offset,
    }
}
