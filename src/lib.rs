//! # sqs-reader
//!
//! Pipelined consumer for an SQS queue fed by SNS. Each message body is a
//! notification envelope whose `Message` field carries newline-delimited JSON;
//! every line comes out as one decoded record, and messages are deleted from
//! the queue once their records have been handed on.
//!
//! ## Design Philosophy
//!
//! - **Overlapped I/O** - the next poll is requested the moment a batch
//!   arrives, so throughput is bounded by the slower of polling and handling
//! - **Failures are dropped, not fatal** - a failed poll, batch or delete is
//!   logged and counted; undeleted messages come back after their visibility
//!   timeout
//! - **Event-driven** - consumers subscribe to [`Event`]s and read
//!   [`StatsSnapshot`]s instead of parsing logs
//!
//! ## Quick Start
//!
//! ```no_run
//! use sqs_reader::{Config, Reader, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(
//!         "https://sqs.us-east-1.amazonaws.com/123456789012/events",
//!         "AKIDEXAMPLE",
//!         "secret",
//!     );
//!     let (reader, mut records) = Reader::new(config)?;
//!
//!     let mut events = reader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!     tokio::spawn(async move {
//!         while let Some(record) = records.recv().await {
//!             println!("{}", serde_json::Value::Object(record));
//!         }
//!     });
//!
//!     run_with_shutdown(reader).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Queue client and request construction
pub mod client;
/// Envelope decoding
pub mod codec;
/// Configuration types
pub mod config;
/// Message deletion
pub mod deleter;
/// Error types
pub mod error;
/// Batch handling
pub mod handler;
/// Message polling
pub mod poller;
/// Orchestrator
pub mod reader;
/// Retry logic with exponential backoff
pub mod retry;
/// Request signing
pub mod signing;
/// Record sinks
pub mod sink;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::{HttpQueueClient, QueueClient, QueueRequests};
pub use config::{
    BatchPolicy, Config, Credentials, LinePolicy, PipelineConfig, QueueConfig, RetryConfig,
};
pub use error::{DecodeError, Error, RecordError, Result};
pub use handler::{HandleOutcome, Handler};
pub use reader::{Reader, ReaderHandle};
pub use signing::{RequestSigner, SigV4Signer, Unsigned};
pub use sink::{ChannelSink, JsonLinesWriter, RecordSink};
pub use types::{Batch, DecodedRecord, Event, ReaderStats, ReceiptHandle, StatsSnapshot};

/// Run a reader until the process is asked to terminate
///
/// The control loop runs on its own task. On SIGTERM or SIGINT (Ctrl+C
/// elsewhere) the quit signal is sent and this returns once the loop has
/// exited. It also returns if the reader is stopped through another
/// [`ReaderHandle`].
///
/// # Errors
///
/// Returns an error if the control loop task panicked.
pub async fn run_with_shutdown(reader: Reader) -> Result<()> {
    let handle = reader.handle();
    let mut task = tokio::spawn(reader.run());

    tokio::select! {
        signal = wait_for_signal() => {
            tracing::info!(signal, "termination requested, stopping reader");
            if let Err(e) = handle.stop().await {
                tracing::debug!(error = %e, "reader already stopped");
            }
        }
        joined = &mut task => return joined.map_err(join_error),
    }

    task.await.map_err(join_error)
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Other(format!("reader task failed: {e}"))
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            "SIGTERM"
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            "SIGINT"
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
            "ctrl_c"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
    "ctrl_c"
}
