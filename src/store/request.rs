use super::{AttributeValue, Expression, Item};
use serde::{Deserialize, Serialize};

/// Which attributes a secondary index copies from the base item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    All,
    KeysOnly,
    Include(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub projection: Projection,
}

/// Table provisioning request.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub hash_key: String,
    pub range_key: Option<String>,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Key attribute names of the base table, hash first.
    pub fn key_attributes(&self) -> Vec<&str> {
        let mut names = vec![self.hash_key.as_str()];
        if let Some(range) = &self.range_key {
            names.push(range);
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutItemRequest {
    pub table: String,
    pub item: Item,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetItemRequest {
    pub table: String,
    pub key: Item,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteItemRequest {
    pub table: String,
    pub key: Item,
    pub condition: Option<Expression>,
}

/// Bound on the range attribute of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    Equal(AttributeValue),
    AtLeast(AttributeValue),
    AtMost(AttributeValue),
    Between(AttributeValue, AttributeValue),
    BeginsWith(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub hash_attribute: String,
    pub hash_value: AttributeValue,
    pub range: Option<(String, RangeBound)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    pub index: Option<String>,
    pub key_condition: KeyCondition,
    pub filter: Option<Expression>,
    pub exclusive_start_key: Option<Item>,
    pub scan_forward: bool,
    pub limit: Option<usize>,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub index: Option<String>,
    pub filter: Option<Expression>,
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<usize>,
    pub consistent_read: bool,
}

/// One page of query or scan results.
///
/// `last_evaluated_key` is `None` only when the store has nothing further.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchWriteRequest {
    pub table: String,
    pub requests: Vec<WriteRequest>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactWriteItem {
    Put {
        table: String,
        item: Item,
        condition: Option<Expression>,
    },
    Delete {
        table: String,
        key: Item,
        condition: Option<Expression>,
    },
}

impl TransactWriteItem {
    pub fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } => table,
        }
    }
}
