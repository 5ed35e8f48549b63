//! Expression evaluation for the in-memory store
//!
//! Understands the condition grammar the planner emits (comparisons, `IN`,
//! `begins_with`, `contains`, `NOT`, `AND`, `OR`, parentheses) and the
//! `SET`/`REMOVE`/`ADD` update grammar of the diff engine.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::client::ExpressionAttributes;
use super::errors::StoreError;
use crate::value::{compare_values, values_equal, Item};

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::service("ValidationException", reason)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Ident(String),
    Index(usize),
    LParen,
    RParen,
    Comma,
    Dot,
    Cmp(CmpOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum PathSeg {
    Key(String),
    Index(usize),
}

fn tokenize(input: &str) -> Result<Vec<Token>, StoreError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let word_end = |start: usize| {
        let mut end = start;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        end
    };

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
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| invalid("Unclosed list index"))?;
                let digits: String = chars[i + 1..i + close].iter().collect();
                let index = digits
                    .parse()
                    .map_err(|_| invalid(format!("Bad list index '{}'", digits)))?;
                tokens.push(Token::Index(index));
                i += close + 1;
            }
            '=' => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('<', Some('>')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    _ => (CmpOp::Gt, 1),
                };
                tokens.push(Token::Cmp(op));
                i += width;
            }
            '#' | ':' => {
                let end = word_end(i + 1);
                let word: String = chars[i..end].iter().collect();
                tokens.push(if c == '#' {
                    Token::Name(word)
                } else {
                    Token::Value(word)
                });
                i = end;
            }
            _ if c.is_alphanumeric() || c == '_' => {
                let end = word_end(i);
                tokens.push(Token::Ident(chars[i..end].iter().collect()));
                i = end;
            }
            _ => return Err(invalid(format!("Unexpected character '{}'", c))),
        }
    }
    Ok(tokens)
}

/// Parsed condition expression
#[derive(Debug, Clone)]
pub(super) enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Vec<PathSeg>, CmpOp, Value),
    In(Vec<PathSeg>, Vec<Value>),
    BeginsWith(Vec<PathSeg>, Value),
    Contains(Vec<PathSeg>, Value),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    attributes: &'a ExpressionAttributes,
}

impl<'a> Parser<'a> {
    fn new(input: &str, attributes: &'a ExpressionAttributes) -> Result<Self, StoreError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            attributes,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), StoreError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            other => Err(invalid(format!("Expected {:?}, found {:?}", expected, other))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn path(&mut self) -> Result<Vec<PathSeg>, StoreError> {
        let mut segments = vec![PathSeg::Key(self.name()?)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    segments.push(PathSeg::Key(self.name()?));
                }
                Some(Token::Index(i)) => {
                    segments.push(PathSeg::Index(*i));
                    self.pos += 1;
                }
                _ => return Ok(segments),
            }
        }
    }

    fn name(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Name(token)) => self
                .attributes
                .names
                .get(&token)
                .cloned()
                .ok_or_else(|| invalid(format!("Undefined name placeholder {}", token))),
            Some(Token::Ident(raw)) => Ok(raw),
            other => Err(invalid(format!("Expected attribute name, found {:?}", other))),
        }
    }

    fn value(&mut self) -> Result<Value, StoreError> {
        match self.next() {
            Some(Token::Value(token)) => self
                .attributes
                .values
                .get(&token)
                .cloned()
                .ok_or_else(|| invalid(format!("Undefined value placeholder {}", token))),
            other => Err(invalid(format!("Expected value placeholder, found {:?}", other))),
        }
    }

    fn condition(&mut self) -> Result<Condition, StoreError> {
        let mut left = self.conjunction()?;
        while self.peek_keyword("OR") {
            self.pos += 1;
            let right = self.conjunction()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Condition, StoreError> {
        let mut left = self.unary()?;
        while self.peek_keyword("AND") {
            self.pos += 1;
            let right = self.unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Condition, StoreError> {
        if self.peek_keyword("NOT") {
            self.pos += 1;
            return Ok(Condition::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.condition()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        if self.peek_keyword("begins_with") || self.peek_keyword("contains") {
            let is_prefix = self.peek_keyword("begins_with");
            self.pos += 1;
            self.expect(Token::LParen)?;
            let path = self.path()?;
            self.expect(Token::Comma)?;
            let value = self.value()?;
            self.expect(Token::RParen)?;
            return Ok(if is_prefix {
                Condition::BeginsWith(path, value)
            } else {
                Condition::Contains(path, value)
            });
        }

        let path = self.path()?;
        if self.peek_keyword("IN") {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let mut values = vec![self.value()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.value()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Condition::In(path, values));
        }
        match self.next() {
            Some(Token::Cmp(op)) => Ok(Condition::Compare(path, op, self.value()?)),
            other => Err(invalid(format!("Expected comparator, found {:?}", other))),
        }
    }
}

/// Parse a key-condition or filter expression.
pub(super) fn parse_condition(
    input: &str,
    attributes: &ExpressionAttributes,
) -> Result<Condition, StoreError> {
    let mut parser = Parser::new(input, attributes)?;
    let condition = parser.condition()?;
    if !parser.at_end() {
        return Err(invalid(format!("Trailing tokens in '{}'", input)));
    }
    Ok(condition)
}

fn resolve<'v>(item: &'v Item, path: &[PathSeg]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut current = match first {
        PathSeg::Key(k) => item.get(k)?,
        PathSeg::Index(_) => return None,
    };
    for seg in rest {
        current = match (seg, current) {
            (PathSeg::Key(k), Value::Object(map)) => map.get(k)?,
            (PathSeg::Index(i), Value::Array(list)) => list.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

impl Condition {
    pub(super) fn matches(&self, item: &Item) -> bool {
        match self {
            Condition::And(a, b) => a.matches(item) && b.matches(item),
            Condition::Or(a, b) => a.matches(item) || b.matches(item),
            Condition::Not(inner) => !inner.matches(item),
            Condition::Compare(path, op, expected) => {
                let Some(actual) = resolve(item, path) else {
                    return *op == CmpOp::Ne;
                };
                match op {
                    CmpOp::Eq => values_equal(actual, expected),
                    CmpOp::Ne => !values_equal(actual, expected),
                    _ => match compare_values(actual, expected) {
                        Some(ord) => match op {
                            CmpOp::Lt => ord == Ordering::Less,
                            CmpOp::Le => ord != Ordering::Greater,
                            CmpOp::Gt => ord == Ordering::Greater,
                            _ => ord != Ordering::Less,
                        },
                        None => false,
                    },
                }
            }
            Condition::In(path, candidates) => resolve(item, path)
                .map(|actual| candidates.iter().any(|c| values_equal(actual, c)))
                .unwrap_or(false),
            Condition::BeginsWith(path, prefix) => match (resolve(item, path), prefix) {
                (Some(Value::String(s)), Value::String(p)) => s.starts_with(p.as_str()),
                _ => false,
            },
            Condition::Contains(path, needle) => match (resolve(item, path), needle) {
                (Some(Value::String(s)), Value::String(n)) => s.contains(n.as_str()),
                (Some(Value::Array(list)), n) => list.iter().any(|v| values_equal(v, n)),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone)]
enum UpdateAction {
    Set(Vec<PathSeg>, Value),
    Remove(Vec<PathSeg>),
    Add(Vec<PathSeg>, Value),
}

fn parse_update(
    input: &str,
    attributes: &ExpressionAttributes,
) -> Result<Vec<UpdateAction>, StoreError> {
    let mut parser = Parser::new(input, attributes)?;
    let mut actions = Vec::new();
    let mut section: Option<String> = None;

    while !parser.at_end() {
        if let Some(Token::Ident(word)) = parser.peek() {
            let upper = word.to_ascii_uppercase();
            if matches!(upper.as_str(), "SET" | "REMOVE" | "ADD") {
                section = Some(upper);
                parser.pos += 1;
                continue;
            }
        }
        let path = parser.path()?;
        let action = match section.as_deref() {
            Some("SET") => {
                parser.expect(Token::Cmp(CmpOp::Eq))?;
                UpdateAction::Set(path, parser.value()?)
            }
            Some("REMOVE") => UpdateAction::Remove(path),
            Some("ADD") => UpdateAction::Add(path, parser.value()?),
            _ => return Err(invalid("Update expression must start with SET, REMOVE or ADD")),
        };
        actions.push(action);
        if parser.peek() == Some(&Token::Comma) {
            parser.pos += 1;
        }
    }
    Ok(actions)
}

fn slot<'v>(item: &'v mut Item, path: &[PathSeg]) -> Option<(&'v mut Value, PathSeg)> {
    let (last, parents) = path.split_last()?;
    let (first, rest) = match parents.split_first() {
        Some(split) => split,
        None => return None,
    };
    let PathSeg::Key(root) = first else {
        return None;
    };
    let mut current = item.entry(root.clone()).or_insert_with(|| Value::Object(Map::new()));
    for seg in rest {
        current = match (seg, current) {
            (PathSeg::Key(k), Value::Object(map)) => {
                map.entry(k.clone()).or_insert_with(|| Value::Object(Map::new()))
            }
            (PathSeg::Index(i), Value::Array(list)) => list.get_mut(*i)?,
            _ => return None,
        };
    }
    Some((current, last.clone()))
}

fn set_path(item: &mut Item, path: &[PathSeg], value: Value) -> Result<(), StoreError> {
    if let [PathSeg::Key(k)] = path {
        item.insert(k.clone(), value);
        return Ok(());
    }
    let (parent, last) = slot(item, path).ok_or_else(|| invalid("Invalid document path"))?;
    match (parent, last) {
        (Value::Object(map), PathSeg::Key(k)) => {
            map.insert(k, value);
        }
        (Value::Array(list), PathSeg::Index(i)) => {
            if i < list.len() {
                list[i] = value;
            } else {
                list.push(value);
            }
        }
        _ => return Err(invalid("Invalid document path")),
    }
    Ok(())
}

fn remove_path(item: &mut Item, path: &[PathSeg]) {
    if let [PathSeg::Key(k)] = path {
        item.remove(k);
        return;
    }
    if let Some((parent, last)) = slot(item, path) {
        match (parent, last) {
            (Value::Object(map), PathSeg::Key(k)) => {
                map.remove(&k);
            }
            (Value::Array(list), PathSeg::Index(i)) if i < list.len() => {
                list.remove(i);
            }
            _ => {}
        }
    }
}

/// Apply an update expression to an item in place.
pub(super) fn apply_update(
    item: &mut Item,
    expression: &str,
    attributes: &ExpressionAttributes,
) -> Result<(), StoreError> {
    let actions = parse_update(expression, attributes)?;
    let mut removals = Vec::new();

    for action in actions {
        match action {
            UpdateAction::Set(path, value) => set_path(item, &path, value)?,
            UpdateAction::Remove(path) => removals.push(path),
            UpdateAction::Add(path, delta) => {
                let delta = delta
                    .as_f64()
                    .ok_or_else(|| invalid("ADD requires a numeric operand"))?;
                let current = resolve(item, &path).and_then(Value::as_f64).unwrap_or(0.0);
                let sum = current + delta;
                let number = if sum.fract() == 0.0 && sum.abs() < 9.0e15 {
                    Number::from(sum as i64)
                } else {
                    Number::from_f64(sum).ok_or_else(|| invalid("ADD produced a non-finite value"))?
                };
                set_path(item, &path, Value::Number(number))?;
            }
        }
    }

    // Higher list indexes first so earlier removals do not shift later ones.
    removals.sort();
    for path in removals.iter().rev() {
        remove_path(item, path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(names: &[(&str, &str)], values: &[(&str, Value)]) -> ExpressionAttributes {
        ExpressionAttributes {
            names: names
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_condition_and_filter() {
        let a = attrs(
            &[("#f0", "user_id"), ("#f1", "age")],
            &[(":v0", json!("u1")), (":v1", json!(18))],
        );
        let cond = parse_condition("#f0 = :v0 AND #f1 >= :v1", &a).unwrap();
        assert!(cond.matches(&item(json!({"user_id": "u1", "age": 20}))));
        assert!(!cond.matches(&item(json!({"user_id": "u1", "age": 17}))));
        assert!(!cond.matches(&item(json!({"user_id": "u2", "age": 20}))));
    }

    #[test]
    fn test_in_not_and_functions() {
        let a = attrs(
            &[("#f0", "status"), ("#f1", "name")],
            &[(":v0", json!("a")), (":v1", json!("b")), (":v2", json!("Al"))],
        );
        let cond = parse_condition(
            "(NOT (#f0 IN (:v0, :v1))) AND (begins_with(#f1, :v2))",
            &a,
        )
        .unwrap();
        assert!(cond.matches(&item(json!({"status": "c", "name": "Alice"}))));
        assert!(!cond.matches(&item(json!({"status": "a", "name": "Alice"}))));
        assert!(!cond.matches(&item(json!({"status": "c", "name": "Bob"}))));
    }

    #[test]
    fn test_apply_update_sections() {
        let a = attrs(
            &[("#f0", "name"), ("#f1", "old"), ("#f2", "count"), ("#f3", "meta"), ("#f4", "tag")],
            &[(":v0", json!("Bob")), (":v1", json!(2)), (":v2", json!("x"))],
        );
        let mut doc = item(json!({"name": "Al", "old": 1, "count": 3, "meta": {"tag": "y"}}));
        apply_update(
            &mut doc,
            "SET #f0 = :v0, #f3.#f4 = :v2 REMOVE #f1 ADD #f2 :v1",
            &a,
        )
        .unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({"name": "Bob", "count": 5, "meta": {"tag": "x"}})
        );
    }

    #[test]
    fn test_remove_list_indexes_from_the_end() {
        let a = attrs(&[("#f0", "tags")], &[]);
        let mut doc = item(json!({"tags": ["a", "b", "c", "d"]}));
        apply_update(&mut doc, "REMOVE #f0[2], #f0[3]", &a).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_undefined_placeholder_rejected() {
        let a = attrs(&[], &[]);
        assert!(parse_condition("#f0 = :v0", &a).is_err());
    }
}
