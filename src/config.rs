//! Configuration types for sqs-reader

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// SQS API version sent with every request
pub const SQS_API_VERSION: &str = "2012-11-05";

/// Signature version advertised in the query string
pub const SIGNATURE_VERSION: &str = "4";

/// Largest batch a single ReceiveMessage call may return
pub const MAX_MESSAGES_LIMIT: u32 = 10;

/// Longest long-poll wait the queue accepts
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Queue endpoint and request shape
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue URL, e.g. `https://sqs.us-east-1.amazonaws.com/123456789012/events`
    pub endpoint: String,

    /// SQS API version (default: "2012-11-05")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Signature version query parameter (default: "4")
    #[serde(default = "default_signature_version")]
    pub signature_version: String,

    /// Long-poll wait in seconds (default: 0, i.e. short polling)
    #[serde(default)]
    pub wait_time_seconds: u32,

    /// Messages requested per poll (default: 10)
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,

    /// Signing region; inferred from an `sqs.<region>.amazonaws.com` host when unset
    #[serde(default)]
    pub region: Option<String>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_version: default_api_version(),
            signature_version: default_signature_version(),
            wait_time_seconds: 0,
            max_messages: default_max_messages(),
            region: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl QueueConfig {
    /// Parse the endpoint, dropping any trailing `?` or query string
    pub fn endpoint_url(&self) -> Result<Url> {
        let trimmed = self.endpoint.trim().trim_end_matches('?');
        if trimmed.is_empty() {
            return Err(Error::config("endpoint", "queue endpoint is required"));
        }
        let mut url = Url::parse(trimmed)?;
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// Region used for signing: explicit setting, else parsed from the host
    pub fn signing_region(&self) -> Option<String> {
        if let Some(region) = &self.region {
            return Some(region.clone());
        }
        let url = self.endpoint_url().ok()?;
        let mut labels = url.host_str()?.split('.');
        match (labels.next(), labels.next()) {
            (Some("sqs"), Some(region)) if region != "amazonaws" => Some(region.to_string()),
            (Some(region), Some("queue")) => Some(region.to_string()),
            _ => None,
        }
    }
}

/// Access key pair for the queue
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Access key id
    #[serde(default)]
    pub access_key: String,

    /// Secret access key
    #[serde(default)]
    pub access_secret: String,
}

impl Credentials {
    /// Build a credential pair
    pub fn new(access_key: impl Into<String>, access_secret: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            access_secret: access_secret.into(),
        }
    }

    /// True when neither half is set
    pub fn is_empty(&self) -> bool {
        self.access_key.is_empty() && self.access_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

/// What to do with the remaining lines of a message after one fails to parse
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePolicy {
    /// Stop decoding the message; lines already decoded are still emitted
    #[default]
    AbortMessage,
    /// Report the bad line and keep decoding its siblings
    SkipLine,
}

/// What to do with the rest of a batch after one message fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop handling the batch and delete none of its messages
    AbortBatch,
    /// Skip the failed message, keep handling, and delete the clean ones
    #[default]
    Isolate,
}

/// Orchestrator tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on batches polled but not yet handled (None = unbounded)
    #[serde(default)]
    pub max_batches_in_flight: Option<usize>,

    /// Capacity of the decoded-record output channel (default: 1024)
    #[serde(default = "default_record_buffer")]
    pub record_buffer: usize,

    /// Capacity of the event broadcast channel (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Handling of malformed lines inside a message
    #[serde(default)]
    pub line_policy: LinePolicy,

    /// Handling of malformed messages inside a batch
    #[serde(default)]
    pub batch_policy: BatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batches_in_flight: None,
            record_buffer: default_record_buffer(),
            event_buffer: default_event_buffer(),
            line_policy: LinePolicy::default(),
            batch_policy: BatchPolicy::default(),
        }
    }
}

/// Retry configuration for poll and delete requests
///
/// The default performs no retries: a failed request is logged and dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`Reader`](crate::Reader)
///
/// Supplied once at startup; there is no runtime reload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Queue endpoint and request shape
    pub queue: QueueConfig,

    /// Access key pair (empty = unsigned requests)
    #[serde(default)]
    pub credentials: Credentials,

    /// Orchestrator tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retry policy for poll requests
    #[serde(default)]
    pub poll_retry: RetryConfig,

    /// Retry policy for delete requests
    #[serde(default)]
    pub delete_retry: RetryConfig,
}

impl Config {
    /// Build a configuration for an endpoint and key pair, everything else default
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            queue: QueueConfig {
                endpoint: endpoint.into(),
                ..Default::default()
            },
            credentials: Credentials::new(access_key, access_secret),
            ..Default::default()
        }
    }

    /// Check settings before the reader starts
    pub fn validate(&self) -> Result<()> {
        self.queue.endpoint_url()?;

        if !(1..=MAX_MESSAGES_LIMIT).contains(&self.queue.max_messages) {
            return Err(Error::config(
                "max_messages",
                format!(
                    "max_messages must be between 1 and {MAX_MESSAGES_LIMIT}, got {}",
                    self.queue.max_messages
                ),
            ));
        }

        if self.queue.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(Error::config(
                "wait_time_seconds",
                format!(
                    "wait_time_seconds must be at most {MAX_WAIT_TIME_SECONDS}, got {}",
                    self.queue.wait_time_seconds
                ),
            ));
        }

        if self.pipeline.max_batches_in_flight == Some(0) {
            return Err(Error::config(
                "max_batches_in_flight",
                "max_batches_in_flight must be at least 1 when set",
            ));
        }

        if self.pipeline.record_buffer == 0 || self.pipeline.event_buffer == 0 {
            return Err(Error::config(
                "record_buffer",
                "channel buffers must be at least 1",
            ));
        }

        let creds = &self.credentials;
        if creds.access_key.is_empty() != creds.access_secret.is_empty() {
            return Err(Error::config(
                "credentials",
                "access_key and access_secret must be set together",
            ));
        }

        Ok(())
    }
}

fn default_api_version() -> String {
    SQS_API_VERSION.to_string()
}

fn default_signature_version() -> String {
    SIGNATURE_VERSION.to_string()
}

fn default_max_messages() -> u32 {
    MAX_MESSAGES_LIMIT
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_record_buffer() -> usize {
    1024
}

fn default_event_buffer() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
