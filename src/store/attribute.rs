use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// One stored item: attribute name to wire value.
pub type Item = HashMap<String, AttributeValue>;

/// The store's attribute-value union.
///
/// Numbers are carried as decimal strings so no precision is lost in
/// transit; the store compares them numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null(bool),
    M(HashMap<String, AttributeValue>),
    L(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::M(_) => "M",
            Self::L(_) => "L",
        }
    }

    /// Whether this value can be part of a table or index key.
    pub fn is_key_value(&self) -> bool {
        matches!(self, Self::S(_) | Self::N(_) | Self::B(_))
    }

    /// Ordering the store uses for key comparisons and range conditions.
    ///
    /// Only values of the same scalar kind are comparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::S(a), Self::S(b)) => Some(a.cmp(b)),
            (Self::B(a), Self::B(b)) => Some(a.cmp(b)),
            (Self::N(a), Self::N(b)) => compare_numbers(a, b),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order across kinds, used to keep stored items sorted.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| kind_rank(self).cmp(&kind_rank(other)))
    }
}

fn kind_rank(value: &AttributeValue) -> u8 {
    match value {
        AttributeValue::N(_) => 0,
        AttributeValue::S(_) => 1,
        AttributeValue::B(_) => 2,
        AttributeValue::Bool(_) => 3,
        AttributeValue::Null(_) => 4,
        AttributeValue::M(_) => 5,
        AttributeValue::L(_) => 6,
    }
}

fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    if let (Ok(a), Ok(b)) = (a.parse::<i128>(), b.parse::<i128>()) {
        return Some(a.cmp(&b));
    }

    let a = a.parse::<f64>().ok()?;
    let b = b.parse::<f64>().ok()?;
    a.partial_cmp(&b)
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                write!(f, "{}", quoted)
            }
            Self::N(n) => write!(f, "{}", n),
            Self::B(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null(_) => write!(f, "null"),
            Self::M(map) => {
                let mut names: Vec<&String> = map.keys().collect();
                names.sort();
                write!(f, "{{")?;
                for (i, name) in names.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", name, map[name])?;
                }
                write!(f, "}}")
            }
            Self::L(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}
