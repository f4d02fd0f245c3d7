use crate::codec::Key;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: Key },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: String, key: Key },

    #[error("Condition failed for {entity}: {key}")]
    ConditionFailed { entity: String, key: Key },

    #[error("Cannot encode attribute '{attribute}': {reason}")]
    Encoding { attribute: String, reason: String },

    #[error("Cannot decode attribute '{attribute}': {reason}")]
    Decoding { attribute: String, reason: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Entity '{entity}' has no index '{index}'")]
    UnknownIndex { entity: String, index: String },

    #[error("Cursor cannot resume '{index}': {reason}")]
    CursorMismatch { index: String, reason: String },

    #[error("Transaction has {count} items, the store accepts at most {max}")]
    TooManyTransactionItems { count: usize, max: usize },

    #[error("Batch has {count} items, the store accepts at most {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Transaction canceled: {}", reasons.join("; "))]
    TransactionCanceled { reasons: Vec<String> },

    #[error("{remaining} batch items still unprocessed after {rounds} rounds")]
    BatchRetriesExhausted { rounds: usize, remaining: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }

    /// Returns `true` for store-side failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::BatchRetriesExhausted { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn encoding(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decoding(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decoding {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Maps a store failure that is not a condition violation.
    ///
    /// Missing tables and indexes become `Schema` so callers can treat them
    /// as fatal; everything else is surfaced unchanged.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::ResourceNotFound(resource) => {
                Self::Schema(format!("store reports missing resource '{}'", resource))
            }
            other => Self::Store(other),
        }
    }
}
