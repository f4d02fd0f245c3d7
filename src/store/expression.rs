use super::{AttributeValue, Item, StoreError, StoreResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A condition or filter in the store's native syntax.
///
/// Attribute names are referenced through `#name` placeholders and values
/// through `:value` placeholders, e.g.
/// `attribute_not_exists(#n0) AND #n1 = :v0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub text: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl Expression {
    /// Evaluate against an item; a missing item is an empty attribute map.
    pub fn evaluate(&self, item: &Item) -> StoreResult<bool> {
        let node = Parser::new(self)?.parse()?;
        Ok(node.eval(item))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Name(String),
    Placeholder(String),
    Word(String),
    Op(Comparator),
}

fn tokenize(text: &str) -> StoreResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
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
            c if c.is_whitespace() => i += 1,
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
            '#' | ':' => {
                let end = word_end(i + 1);
                if end == i + 1 {
                    return Err(StoreError::Validation(format!(
                        "empty placeholder at offset {} in '{}'",
                        i, text
                    )));
                }
                let raw: String = chars[i..end].iter().collect();
                tokens.push(if c == '#' {
                    Token::Name(raw)
                } else {
                    Token::Placeholder(raw)
                });
                i = end;
            }
            '=' => {
                tokens.push(Token::Op(Comparator::Eq));
                i += 1;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(Comparator::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(Comparator::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(Comparator::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(Comparator::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(Comparator::Gt));
                    i += 1;
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let end = word_end(i);
                tokens.push(Token::Word(chars[i..end].iter().collect()));
                i = end;
            }
            other => {
                return Err(StoreError::Validation(format!(
                    "unexpected character '{}' in '{}'",
                    other, text
                )));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Operand {
    Path(String),
    Value(AttributeValue),
}

impl Operand {
    fn resolve<'a>(&'a self, item: &'a Item) -> Option<&'a AttributeValue> {
        match self {
            Self::Path(name) => item.get(name),
            Self::Value(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Or(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Exists(String),
    NotExists(String),
    BeginsWith(Operand, Operand),
    Compare(Operand, Comparator, Operand),
    Between(Operand, Operand, Operand),
}

impl Node {
    fn eval(&self, item: &Item) -> bool {
        match self {
            Self::Or(a, b) => a.eval(item) || b.eval(item),
            Self::And(a, b) => a.eval(item) && b.eval(item),
            Self::Not(inner) => !inner.eval(item),
            Self::Exists(name) => item.get(name).is_some_and(|v| !v.is_null()),
            Self::NotExists(name) => item.get(name).is_none_or(|v| v.is_null()),
            Self::BeginsWith(target, prefix) => {
                match (target.resolve(item), prefix.resolve(item)) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(p))) => s.starts_with(p.as_str()),
                    (Some(AttributeValue::B(b)), Some(AttributeValue::B(p))) => b.starts_with(p),
                    _ => false,
                }
            }
            Self::Compare(left, op, right) => match (left.resolve(item), right.resolve(item)) {
                (Some(a), Some(b)) => match op {
                    Comparator::Eq => values_equal(a, b),
                    Comparator::Ne => !values_equal(a, b),
                    other => a.compare(b).is_some_and(|ord| other.holds(ord)),
                },
                _ => false,
            },
            Self::Between(target, low, high) => {
                match (target.resolve(item), low.resolve(item), high.resolve(item)) {
                    (Some(v), Some(lo), Some(hi)) => {
                        v.compare(lo).is_some_and(|o| o != Ordering::Less)
                            && v.compare(hi).is_some_and(|o| o != Ordering::Greater)
                    }
                    _ => false,
                }
            }
        }
    }
}

fn values_equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

struct Parser<'a> {
    expression: &'a Expression,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a Expression) -> StoreResult<Self> {
        Ok(Self {
            expression,
            tokens: tokenize(&expression.text)?,
            pos: 0,
        })
    }

    fn parse(mut self) -> StoreResult<Node> {
        let node = self.or()?;
        if self.pos != self.tokens.len() {
            return Err(self.error("trailing tokens"));
        }
        Ok(node)
    }

    fn error(&self, reason: &str) -> StoreError {
        StoreError::Validation(format!(
            "{} at token {} of '{}'",
            reason, self.pos, self.expression.text
        ))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> StoreResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {:?}", expected))),
        }
    }

    fn or(&mut self) -> StoreResult<Node> {
        let mut node = self.and()?;
        while self.peek_keyword("OR") {
            self.pos += 1;
            node = Node::Or(Box::new(node), Box::new(self.and()?));
        }
        Ok(node)
    }

    fn and(&mut self) -> StoreResult<Node> {
        let mut node = self.not()?;
        while self.peek_keyword("AND") {
            self.pos += 1;
            node = Node::And(Box::new(node), Box::new(self.not()?));
        }
        Ok(node)
    }

    fn not(&mut self) -> StoreResult<Node> {
        if self.peek_keyword("NOT") {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.not()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> StoreResult<Node> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let node = self.or()?;
            self.expect(Token::RParen)?;
            return Ok(node);
        }

        let function = match (self.peek(), self.tokens.get(self.pos + 1)) {
            (Some(Token::Word(word)), Some(Token::LParen)) => Some(word.to_ascii_lowercase()),
            _ => None,
        };

        match function.as_deref() {
            Some("attribute_exists") | Some("attribute_not_exists") => {
                let exists = function.as_deref() == Some("attribute_exists");
                self.pos += 2;
                let name = match self.operand()? {
                    Operand::Path(name) => name,
                    Operand::Value(_) => return Err(self.error("expected attribute path")),
                };
                self.expect(Token::RParen)?;
                Ok(if exists {
                    Node::Exists(name)
                } else {
                    Node::NotExists(name)
                })
            }
            Some("begins_with") => {
                self.pos += 2;
                let target = self.operand()?;
                self.expect(Token::Comma)?;
                let prefix = self.operand()?;
                self.expect(Token::RParen)?;
                Ok(Node::BeginsWith(target, prefix))
            }
            Some(_) => Err(self.error("unknown function")),
            None => self.comparison(),
        }
    }

    fn comparison(&mut self) -> StoreResult<Node> {
        let left = self.operand()?;

        if self.peek_keyword("BETWEEN") {
            self.pos += 1;
            let low = self.operand()?;
            if !self.peek_keyword("AND") {
                return Err(self.error("expected AND in BETWEEN"));
            }
            self.pos += 1;
            let high = self.operand()?;
            return Ok(Node::Between(left, low, high));
        }

        match self.next() {
            Some(Token::Op(op)) => {
                let right = self.operand()?;
                Ok(Node::Compare(left, op, right))
            }
            _ => Err(self.error("expected comparison operator")),
        }
    }

    fn operand(&mut self) -> StoreResult<Operand> {
        match self.next() {
            Some(Token::Name(placeholder)) => self
                .expression
                .names
                .get(&placeholder)
                .cloned()
                .map(Operand::Path)
                .ok_or_else(|| self.error(&format!("undefined name placeholder {}", placeholder))),
            Some(Token::Placeholder(placeholder)) => self
                .expression
                .values
                .get(&placeholder)
                .cloned()
                .map(Operand::Value)
                .ok_or_else(|| self.error(&format!("undefined value placeholder {}", placeholder))),
            Some(Token::Word(word)) => Ok(Operand::Path(word)),
            _ => Err(self.error("expected operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(text: &str, names: &[(&str, &str)], values: &[(&str, AttributeValue)]) -> Expression {
        Expression {
            text: text.to_string(),
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

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_not_exists_on_empty_item() {
        let e = expr("attribute_not_exists(#n0)", &[("#n0", "name")], &[]);
        assert!(e.evaluate(&Item::new()).unwrap());
        assert!(!e
            .evaluate(&item(&[("name", AttributeValue::S("a".into()))]))
            .unwrap());
    }

    #[test]
    fn test_and_or_not_precedence() {
        let e = expr(
            "#a = :one OR NOT (#b >= :two) AND #b BETWEEN :zero AND :two",
            &[("#a", "a"), ("#b", "b")],
            &[
                (":zero", AttributeValue::N("0".into())),
                (":one", AttributeValue::N("1".into())),
                (":two", AttributeValue::N("2".into())),
            ],
        );

        let hit = item(&[("a", AttributeValue::N("9".into())), ("b", AttributeValue::N("1".into()))]);
        assert!(e.evaluate(&hit).unwrap());

        let miss = item(&[("a", AttributeValue::N("9".into())), ("b", AttributeValue::N("5".into()))]);
        assert!(!e.evaluate(&miss).unwrap());
    }

    #[test]
    fn test_begins_with_and_missing_attribute() {
        let e = expr(
            "begins_with(#p, :pre) AND #missing <> :pre",
            &[("#p", "path"), ("#missing", "other")],
            &[(":pre", AttributeValue::S("ab".into()))],
        );
        assert!(!e
            .evaluate(&item(&[("path", AttributeValue::S("abc".into()))]))
            .unwrap());
    }

    #[test]
    fn test_undefined_placeholder_is_validation_error() {
        let e = expr("#n0 = :v9", &[("#n0", "name")], &[]);
        assert!(matches!(e.evaluate(&Item::new()), Err(StoreError::Validation(_))));
    }
}
