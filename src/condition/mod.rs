//! Conditional write predicates and query/scan filters.
//!
//! A [`Condition`] is a tree over attribute existence and comparisons. It is
//! compiled into the store's placeholder syntax only when a request is
//! built; `None` is the "no condition" identity everywhere it is accepted.

use crate::core::Value;
use crate::store::{AttributeValue, Comparator, Expression};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(String),
    NotExists(String),
    Compare {
        attribute: String,
        op: Comparator,
        value: Value,
    },
    BeginsWith {
        attribute: String,
        prefix: String,
    },
    Between {
        attribute: String,
        low: Value,
        high: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// None of `attributes` exist on the stored item.
    ///
    /// Guarding a put with the primary key attributes makes it create-only.
    pub fn not_exists<S: AsRef<str>>(attributes: &[S]) -> Self {
        Self::and(
            attributes
                .iter()
                .map(|name| Self::NotExists(name.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn exists(attribute: impl Into<String>) -> Self {
        Self::Exists(attribute.into())
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Comparator::Eq, value)
    }

    pub fn compare(attribute: impl Into<String>, op: Comparator, value: impl Into<Value>) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn begins_with(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::BeginsWith {
            attribute: attribute.into(),
            prefix: prefix.into(),
        }
    }

    pub fn between(
        attribute: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            attribute: attribute.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Conjunction; a single condition is returned unwrapped.
    pub fn and(mut conditions: Vec<Condition>) -> Self {
        if conditions.len() == 1 {
            return conditions.remove(0);
        }
        Self::And(conditions)
    }

    pub fn or(mut conditions: Vec<Condition>) -> Self {
        if conditions.len() == 1 {
            return conditions.remove(0);
        }
        Self::Or(conditions)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Whether this condition constrains nothing.
    ///
    /// Empty `And`/`Or` groups are dropped during compilation.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.iter().all(Condition::is_empty),
            Self::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Compiles into the store's expression syntax; `None` if empty.
    pub fn compile(&self) -> Option<Expression> {
        let mut compiler = Compiler::default();
        let text = compiler.emit(self)?;
        Some(Expression {
            text,
            names: compiler.names,
            values: compiler.values,
        })
    }
}

#[derive(Default)]
struct Compiler {
    names: HashMap<String, String>,
    aliases: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Compiler {
    fn name(&mut self, attribute: &str) -> String {
        if let Some(alias) = self.aliases.get(attribute) {
            return alias.clone();
        }
        let alias = format!("#n{}", self.aliases.len());
        self.aliases.insert(attribute.to_string(), alias.clone());
        self.names.insert(alias.clone(), attribute.to_string());
        alias
    }

    fn value(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    fn emit(&mut self, condition: &Condition) -> Option<String> {
        let text = match condition {
            Condition::Exists(attribute) => format!("attribute_exists({})", self.name(attribute)),
            Condition::NotExists(attribute) => {
                format!("attribute_not_exists({})", self.name(attribute))
            }
            Condition::Compare { attribute, op, value } => {
                let name = self.name(attribute);
                let value = self.value(value.to_attribute_value());
                format!("{} {} {}", name, op.symbol(), value)
            }
            Condition::BeginsWith { attribute, prefix } => {
                let name = self.name(attribute);
                let prefix = self.value(AttributeValue::S(prefix.clone()));
                format!("begins_with({}, {})", name, prefix)
            }
            Condition::Between { attribute, low, high } => {
                let name = self.name(attribute);
                let low = self.value(low.to_attribute_value());
                let high = self.value(high.to_attribute_value());
                format!("{} BETWEEN {} AND {}", name, low, high)
            }
            Condition::And(children) => return self.group(children, "AND"),
            Condition::Or(children) => return self.group(children, "OR"),
            Condition::Not(inner) => format!("NOT ({})", self.emit(inner)?),
        };
        Some(text)
    }

    fn group(&mut self, children: &[Condition], keyword: &str) -> Option<String> {
        let parts: Vec<String> = children.iter().filter_map(|c| self.emit(c)).collect();
        match parts.len() {
            0 => None,
            1 => parts.into_iter().next(),
            _ => Some(
                parts
                    .iter()
                    .map(|p| format!("({})", p))
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", keyword)),
            ),
        }
    }
}
