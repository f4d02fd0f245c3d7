use super::{
    BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, GetItemRequest, Item, Page,
    PutItemRequest, QueryRequest, ScanRequest, TableSchema, TransactWriteItem,
};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Why one item of a transaction was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed,
    Other(String),
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ConditionalCheckFailed => write!(f, "conditional check failed"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Conditional check failed")]
    ConditionalCheckFailed,

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Transaction canceled")]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    #[error("Request throttled")]
    Throttled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service error: {0}")]
    Service(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Service(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Item-level operations of the remote hash/range store.
///
/// Implementations own transport and authentication; the adapter layer
/// only ever talks to a store through this trait.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Provision a table and its secondary indexes.
    async fn create_table(&self, schema: TableSchema) -> StoreResult<()>;

    async fn put_item(&self, request: PutItemRequest) -> StoreResult<()>;

    async fn get_item(&self, request: GetItemRequest) -> StoreResult<Option<Item>>;

    /// Deleting a missing item is not an error.
    async fn delete_item(&self, request: DeleteItemRequest) -> StoreResult<()>;

    async fn query(&self, request: QueryRequest) -> StoreResult<Page>;

    async fn scan(&self, request: ScanRequest) -> StoreResult<Page>;

    /// Apply a batch of puts and deletes; returns whatever the store did not process.
    async fn batch_write_item(&self, request: BatchWriteRequest) -> StoreResult<BatchWriteOutput>;

    /// Apply every write or none of them.
    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> StoreResult<()>;
}
