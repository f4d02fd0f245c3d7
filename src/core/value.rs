use super::ScalarType;
use crate::store::AttributeValue;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::String(_) => ScalarType::String,
            Self::Integer(_) => ScalarType::Integer,
            Self::Float(_) => ScalarType::Float,
            Self::Boolean(_) => ScalarType::Boolean,
            Self::Binary(_) => ScalarType::Binary,
            Self::Timestamp(_) => ScalarType::Timestamp,
        }
    }

    /// Textual form used inside composite keys.
    ///
    /// `Value::parse(self.scalar_type(), &self.render())` returns the same value.
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Binary(bytes) => hex::encode(bytes),
            Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    pub fn parse(scalar: ScalarType, raw: &str) -> std::result::Result<Self, String> {
        match scalar {
            ScalarType::String => Ok(Self::String(raw.to_string())),
            ScalarType::Integer => raw
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|e| format!("'{}' is not an integer: {}", raw, e)),
            ScalarType::Float => raw
                .parse::<f64>()
                .map(Self::Float)
                .map_err(|e| format!("'{}' is not a float: {}", raw, e)),
            ScalarType::Boolean => raw
                .parse::<bool>()
                .map(Self::Boolean)
                .map_err(|e| format!("'{}' is not a boolean: {}", raw, e)),
            ScalarType::Binary => hex::decode(raw)
                .map(Self::Binary)
                .map_err(|e| format!("'{}' is not valid hex: {}", raw, e)),
            ScalarType::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|ts| Self::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", raw, e)),
        }
    }

    /// Wire representation of this value.
    ///
    /// Numbers travel as decimal strings; timestamps as RFC 3339 strings.
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Self::String(s) => AttributeValue::S(s.clone()),
            Self::Integer(_) | Self::Float(_) => AttributeValue::N(self.render()),
            Self::Boolean(b) => AttributeValue::Bool(*b),
            Self::Binary(bytes) => AttributeValue::B(bytes.clone()),
            Self::Timestamp(_) => AttributeValue::S(self.render()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}
