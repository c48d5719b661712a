//! Redpanda configuration.

use engine_core::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Connection settings shared by the consumer and the producer.
///
/// The two never share a connection; each builds its own client from this.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedpandaConfig {
    /// Broker addresses
    #[validate(length(min = 1))]
    pub brokers: Vec<String>,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub producer: ProducerConfig,
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            consumer: ConsumerConfig::default(),
            producer: ProducerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Both SASL credentials, when configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Where a fresh consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl FromStr for OffsetReset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" | "smallest" | "beginning" => Ok(Self::Earliest),
            "latest" | "largest" | "end" => Ok(Self::Latest),
            other => Err(Error::config(format!("unknown offset reset policy: {other}"))),
        }
    }
}

/// Consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumerConfig {
    /// Consumer group id
    #[validate(length(min = 1))]
    pub group_id: String,
    /// Topics to subscribe to
    #[validate(length(min = 1))]
    pub topics: Vec<String>,
    #[serde(default)]
    pub offset_reset: OffsetReset,
    /// Messages per batch before a size-triggered flush
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Flush period in milliseconds; also caps a single blocking read
    #[serde(default = "default_flush_period_ms")]
    #[validate(range(min = 1))]
    pub flush_period_ms: u64,
    /// Upper bound on bytes per partition fetch
    #[serde(default = "default_max_fetch_bytes")]
    #[validate(range(min = 1))]
    pub max_fetch_bytes: i32,
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_period_ms() -> u64 {
    5000
}

fn default_max_fetch_bytes() -> i32 {
    1024 * 1024
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: "presence".to_string(),
            topics: vec!["objects".to_string()],
            offset_reset: OffsetReset::default(),
            batch_size: default_batch_size(),
            flush_period_ms: default_flush_period_ms(),
            max_fetch_bytes: default_max_fetch_bytes(),
        }
    }
}

impl ConsumerConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }
}

/// Producer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProducerConfig {
    /// Topic that triggered identifier lists are published to
    #[validate(length(min = 1))]
    pub topic: String,
    /// Capacity of the in-process send queue
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Write retries per batch before it is reported as failed
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Records per broker write
    #[serde(default = "default_max_batch_records")]
    #[validate(range(min = 1))]
    pub max_batch_records: usize,
    /// How long `stop` may spend delivering queued records
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    /// Wait before retrying an enqueue that hit a full queue
    #[serde(default = "default_queue_full_backoff_ms")]
    pub queue_full_backoff_ms: u64,
    /// Wait before retrying an enqueue that failed for any other reason
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_compression() -> String {
    "none".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_batch_records() -> usize {
    500
}

fn default_flush_timeout_ms() -> u64 {
    15_000
}

fn default_queue_full_backoff_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    2000
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: "objects".to_string(),
            queue_capacity: default_queue_capacity(),
            compression: default_compression(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_batch_records: default_max_batch_records(),
            flush_timeout_ms: default_flush_timeout_ms(),
            queue_full_backoff_ms: default_queue_full_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl ProducerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn queue_full_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_full_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
