//! Everything an application needs to declare entities and talk to a store.
//!
//! ```ignore
//! use schemakv::prelude::*;
//! ```

pub use crate::{
    Adapter, AdapterConfig, Condition, Context, Cursor, Entity, Error, QueryOptions, Result,
    ScanOptions, Transaction, TransactionCoordinator, Value,
};
pub use crate::store::{MemoryStore, StoreClient};
