//! Operational limits of a connection.

use rand::Rng;
use std::{env, time::Duration};

/// Retry configuration for batch operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial request
    pub max_retries: usize,
    /// Base delay, doubled on every attempt
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Calculate retry delay with exponential backoff and full jitter
    ///
    /// The upper bound for `attempt` (0-based) is `initial * 2^attempt`, capped at `max`;
    /// the returned delay is drawn uniformly below that bound.
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let factor: f64 = rand::thread_rng().r#gen();
        ceiling.mul_f64(factor)
    }

    fn backoff_ceiling(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX).min(31);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        let capped_delay = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Limits enforced by the managers of a [`crate::Connection`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Maximum items in one atomic write transaction
    pub max_transaction_items: usize,
    /// Maximum items in one batch write call
    pub max_batch_write_items: usize,
    /// Maximum keys in one batch get call
    pub max_batch_read_items: usize,
    /// Maximum requests in flight for one batch or parallel scan call
    pub max_concurrency: usize,
    /// Retry policy for unprocessed batch items
    pub batch_retry: RetryConfig,
    /// Items accumulated by `find` and scans when the caller sets no limit, counts are not capped
    pub default_query_limit: usize,
}

impl ConnectionConfig {
    /// Create configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_transaction_items: env_usize(
                "DYNAMO_ENTITY_MAX_TRANSACTION_ITEMS",
                defaults.max_transaction_items,
            ),
            max_concurrency: env_usize("DYNAMO_ENTITY_MAX_CONCURRENCY", defaults.max_concurrency),
            batch_retry: RetryConfig {
                max_retries: env_usize(
                    "DYNAMO_ENTITY_MAX_RETRIES",
                    defaults.batch_retry.max_retries,
                ),
                ..defaults.batch_retry
            },
            default_query_limit: env_usize(
                "DYNAMO_ENTITY_DEFAULT_QUERY_LIMIT",
                defaults.default_query_limit,
            ),
            ..defaults
        }
    }

    /// Set the per transaction item limit
    pub fn with_max_transaction_items(mut self, limit: usize) -> Self {
        self.max_transaction_items = limit;
        self
    }

    /// Set the concurrency limit
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Set the batch retry policy
    pub fn with_batch_retry(mut self, retry: RetryConfig) -> Self {
        self.batch_retry = retry;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_transaction_items: 100,
            max_batch_write_items: 25,
            max_batch_read_items: 100,
            max_concurrency: 5,
            batch_retry: RetryConfig::default(),
            default_query_limit: 3000,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
