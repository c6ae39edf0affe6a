//! Error types for sqs-reader
//!
//! This module provides the error taxonomy used across the reader pipeline:
//! - Transport errors (network failure, non-2xx responses from the queue)
//! - Decode errors (the queue's poll response violates its schema)
//! - Record errors (a message envelope or one of its lines is malformed)
//!
//! Every error is caught at the task boundary by the orchestrator, so none of
//! these ever terminate the process. They surface as [`Event`](crate::Event)s
//! and counters instead.

use thiserror::Error;

/// Result type alias for sqs-reader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sqs-reader
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_messages")
        key: Option<String>,
    },

    /// Network or transport failure talking to the queue endpoint
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The queue endpoint answered with a non-success status
    #[error("queue returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (truncated by the caller if large)
        body: String,
    },

    /// The poll response could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A message envelope or one of its records is malformed
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Request signing failed
    #[error("signing error: {0}")]
    Signing(String),

    /// Endpoint URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error (sink writes)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record sink or a control channel has been closed
    #[error("shutdown in progress: {0} closed")]
    ShuttingDown(&'static str),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors decoding the outer poll response
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The response body is not a well-formed receive-message response
    #[error("malformed receive response: {0}")]
    Xml(String),

    /// Bodies and receipt handles came back with different lengths
    #[error("misaligned batch: {bodies} bodies but {handles} receipt handles")]
    MisalignedBatch {
        /// Number of message bodies decoded
        bodies: usize,
        /// Number of receipt handles decoded
        handles: usize,
    },
}

/// Errors decoding the two-layer message envelope
#[derive(Debug, Error)]
pub enum RecordError {
    /// The message body is not a JSON object
    #[error("message {index}: body is not a JSON object: {reason}")]
    MalformedBody {
        /// Position of the message within its batch
        index: usize,
        /// Parser error
        reason: String,
    },

    /// The body lacks a string `Message` field
    #[error("message {index}: corrupted envelope")]
    CorruptedEnvelope {
        /// Position of the message within its batch
        index: usize,
    },

    /// One line of the inner payload is not a JSON object
    #[error("message {index} line {line}: {reason}")]
    MalformedLine {
        /// Position of the message within its batch
        index: usize,
        /// 1-based line number within the inner payload
        line: usize,
        /// Parser error
        reason: String,
    },
}

impl RecordError {
    /// Position of the failing message within its batch
    pub fn message_index(&self) -> usize {
        match self {
            RecordError::MalformedBody { index, .. }
            | RecordError::CorruptedEnvelope { index }
            | RecordError::MalformedLine { index, .. } => *index,
        }
    }
}

impl Error {
    /// Machine-readable error code, stable across releases
    ///
    /// Used by [`Event`](crate::Event) payloads so subscribers can count failures
    /// by category without matching on display strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transport(_) => "transport_error",
            Error::Http { .. } => "http_error",
            Error::Decode(e) => match e {
                DecodeError::Xml(_) => "decode_error",
                DecodeError::MisalignedBatch { .. } => "misaligned_batch",
            },
            Error::Record(e) => e.kind(),
            Error::Signing(_) => "signing_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown(_) => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }

    /// Shorthand for a configuration error on a named key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

impl RecordError {
    /// Machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MalformedBody { .. } => "malformed_body",
            RecordError::CorruptedEnvelope { .. } => "corrupted_envelope",
            RecordError::MalformedLine { .. } => "malformed_line",
        }
    }
}
