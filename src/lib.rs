// ============================================================================
// schemakv Library
// ============================================================================
//
// Schema-driven entity adapter for hash/range key-value stores: key and
// item codecs, CRUD, cursor-paginated query and scan, batch writes with
// unprocessed-item retry, and atomic multi-item transactions.

extern crate self as schemakv;

pub mod adapter;
pub mod codec;
pub mod condition;
pub mod config;
pub mod context;
pub mod core;
pub mod cursor;
pub mod prelude;
pub mod schema;
pub mod store;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use adapter::{Adapter, QueryOptions, ResultPage, ScanOptions};
pub use codec::{ItemCodec, Key, KeyCodec};
pub use condition::Condition;
pub use config::{AdapterConfig, BatchRetryPolicy, DecodeErrorPolicy};
pub use context::{CancelHandle, Context, RateLimiter, TokenBucket};
pub use crate::core::{Error, Record, Result, ScalarType, Value};
pub use cursor::Cursor;
pub use schema::{Entity, EntityDescriptor, FieldValue, IndexDef, Projection};
pub use store::{AttributeValue, Comparator, Item, MemoryStore, StoreClient, StoreError};
pub use transaction::{Transaction, TransactionCoordinator};

pub use schemakv_derive::Entity;
