//! Wire-level model of the remote hash/range store.
//!
//! Everything above this module speaks in entities and descriptors;
//! everything in it speaks in items, keys and expressions.

pub mod attribute;
pub mod client;
pub mod expression;
pub mod memory;
pub mod request;

pub use attribute::{AttributeValue, Item};
pub use client::{CancellationReason, StoreClient, StoreError, StoreResult};
pub use expression::{Comparator, Expression};
pub use memory::{MemoryStore, StoreStats};
pub use request::{
    BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, GetItemRequest, IndexSchema,
    KeyCondition, Page, Projection, PutItemRequest, QueryRequest, RangeBound, ScanRequest,
    TableSchema, TransactWriteItem, WriteRequest,
};

/// Writes accepted by a single batch write call, for any store.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Items accepted by a single transactional write, for any store.
pub const MAX_TRANSACT_ITEMS: usize = 100;
