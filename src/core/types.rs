use super::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Untyped form of an entity instance: attribute name to scalar value.
///
/// Absent optional attributes are simply missing from the map.
pub type Record = BTreeMap<String, Value>;

/// Scalar attribute types an entity descriptor may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Binary,
    Timestamp,
}

impl ScalarType {
    /// Whether an attribute of this type may serve as a hash or range key.
    pub fn is_key_type(&self) -> bool {
        !matches!(self, Self::Boolean)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Binary => "BINARY",
            Self::Timestamp => "TIMESTAMP",
        };
        write!(f, "{}", name)
    }
}
