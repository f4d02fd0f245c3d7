use crate::core::{Error, Result};
use crate::store::{MAX_BATCH_WRITE_ITEMS, MAX_TRANSACT_ITEMS};
use std::time::Duration;

/// Backoff between rounds of the batch unprocessed-item loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRetryPolicy {
    /// Store calls per batch before giving up with `BatchRetriesExhausted`.
    pub max_rounds: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BatchRetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            base_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl BatchRetryPolicy {
    /// Retry until the store reports nothing unprocessed.
    pub fn unbounded() -> Self {
        Self {
            max_rounds: usize::MAX,
            ..Self::default()
        }
    }

    /// Delay before `round` (1-based retry number): doubling, capped.
    pub fn backoff(&self, round: usize) -> Duration {
        let shift = round.saturating_sub(1).min(16) as u32;
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// What iteration does with an item that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    #[default]
    Fail,
    /// Log and skip the item.
    Skip,
}

/// Adapter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// Table name; defaults to the descriptor's table
    pub table_name: Option<String>,

    /// Strongly consistent point reads and base-table queries
    pub consistent_reads: bool,

    /// Items the store evaluates per query or scan call
    pub page_size: Option<usize>,

    /// Largest batch accepted by `batch_save` / `batch_delete`
    pub max_batch_size: usize,

    /// Largest transaction accepted by `transact_save`
    pub max_transaction_items: usize,

    pub batch_retry: BatchRetryPolicy,

    pub decode_errors: DecodeErrorPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            table_name: None,
            consistent_reads: true,
            page_size: None,
            max_batch_size: MAX_BATCH_WRITE_ITEMS,
            max_transaction_items: MAX_TRANSACT_ITEMS,
            batch_retry: BatchRetryPolicy::default(),
            decode_errors: DecodeErrorPolicy::Fail,
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_name(mut self, table: &str) -> Self {
        self.table_name = Some(table.to_string());
        self
    }

    pub fn consistent_reads(mut self, consistent: bool) -> Self {
        self.consistent_reads = consistent;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn max_transaction_items(mut self, max: usize) -> Self {
        self.max_transaction_items = max;
        self
    }

    pub fn batch_retry(mut self, policy: BatchRetryPolicy) -> Self {
        self.batch_retry = policy;
        self
    }

    pub fn decode_errors(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.table_name.as_deref().is_some_and(str::is_empty) {
            return Err(Error::InvalidOptions("table name cannot be empty".to_string()));
        }

        if self.page_size == Some(0) {
            return Err(Error::InvalidOptions("page_size must be > 0".to_string()));
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_WRITE_ITEMS {
            return Err(Error::InvalidOptions(format!(
                "max_batch_size must be between 1 and {}",
                MAX_BATCH_WRITE_ITEMS
            )));
        }

        if self.max_transaction_items == 0 || self.max_transaction_items > MAX_TRANSACT_ITEMS {
            return Err(Error::InvalidOptions(format!(
                "max_transaction_items must be between 1 and {}",
                MAX_TRANSACT_ITEMS
            )));
        }

        if self.batch_retry.max_rounds == 0 {
            return Err(Error::InvalidOptions(
                "batch_retry.max_rounds must be > 0".to_string(),
            ));
        }

        if self.batch_retry.base_backoff > self.batch_retry.max_backoff {
            return Err(Error::InvalidOptions(
                "batch_retry.base_backoff cannot exceed max_backoff".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert!(config.consistent_reads);
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.max_transaction_items, 100);
        assert_eq!(config.batch_retry.max_rounds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = AdapterConfig::new()
            .table_name("things")
            .consistent_reads(false)
            .page_size(1)
            .max_batch_size(10);

        assert_eq!(config.table_name.as_deref(), Some("things"));
        assert!(!config.consistent_reads);
        assert_eq!(config.page_size, Some(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(AdapterConfig::new().max_batch_size(26).validate().is_err());
        assert!(AdapterConfig::new().page_size(0).validate().is_err());
        assert!(AdapterConfig::new().max_transaction_items(0).validate().is_err());
        assert!(
            AdapterConfig::new()
                .batch_retry(BatchRetryPolicy {
                    max_rounds: 0,
                    ..BatchRetryPolicy::default()
                })
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_limits_follow_store_protocol() {
        let config = AdapterConfig::default();
        assert_eq!(config.max_batch_size, crate::store::MAX_BATCH_WRITE_ITEMS);
        assert_eq!(config.max_transaction_items, crate::store::MAX_TRANSACT_ITEMS);
        assert!(
            AdapterConfig::new()
                .max_transaction_items(crate::store::MAX_TRANSACT_ITEMS + 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BatchRetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(25));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
        assert_eq!(policy.backoff(3), Duration::from_millis(100));
        assert_eq!(policy.backoff(20), Duration::from_secs(1));
    }
}
