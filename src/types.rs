//! Core types for sqs-reader

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One fully unwrapped payload handed to the sink
pub type DecodedRecord = serde_json::Map<String, serde_json::Value>;

/// Opaque handle identifying one received message instance for deletion
///
/// Valid until the message is deleted or its visibility window lapses on the
/// queue side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    /// Create a new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Borrow the raw handle
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ReceiptHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

impl From<&str> for ReceiptHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One poll's worth of messages
///
/// `bodies[i]` and `receipt_handles[i]` describe the same message. The fields
/// are private so the alignment can only be established by [`Batch::new`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    bodies: Vec<String>,
    receipt_handles: Vec<ReceiptHandle>,
}

impl Batch {
    /// Pair bodies with their receipt handles
    ///
    /// Returns `None` if the two sequences differ in length.
    pub fn new(bodies: Vec<String>, receipt_handles: Vec<ReceiptHandle>) -> Option<Self> {
        (bodies.len() == receipt_handles.len()).then_some(Self {
            bodies,
            receipt_handles,
        })
    }

    /// Raw message bodies in receive order
    pub fn bodies(&self) -> &[String] {
        &self.bodies
    }

    /// Receipt handles, index-aligned with [`bodies`](Self::bodies)
    pub fn receipt_handles(&self) -> &[ReceiptHandle] {
        &self.receipt_handles
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// True when the poll returned no messages
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Consume the batch, keeping only its receipt handles
    pub fn into_receipt_handles(self) -> Vec<ReceiptHandle> {
        self.receipt_handles
    }
}

/// Events emitted by the reader
///
/// Every failure the orchestrator swallows is reported here, so a supervisor
/// can count and react to failures without parsing log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A poll request is about to be issued
    PollStarted,

    /// A poll returned a batch
    Polled {
        /// Number of messages in the batch
        messages: usize,
    },

    /// A poll failed and its trigger was dropped
    PollFailed {
        /// Machine-readable error code
        kind: String,
        /// Error message
        error: String,
    },

    /// A batch finished handling
    Handled {
        /// Messages in the batch
        messages: usize,
        /// Records emitted to the sink
        records: usize,
        /// Messages withheld from deletion because they failed to decode
        failed: usize,
    },

    /// A message or line failed to decode and was skipped
    RecordFailed {
        /// Machine-readable error code
        kind: String,
        /// Error message
        error: String,
    },

    /// Handling of a batch was abandoned; none of its messages will be deleted
    HandleFailed {
        /// Machine-readable error code
        kind: String,
        /// Error message
        error: String,
    },

    /// A delete request succeeded
    Deleted {
        /// Number of receipt handles in the request
        count: usize,
    },

    /// A delete request failed and was dropped
    DeleteFailed {
        /// Machine-readable error code
        kind: String,
        /// Error message
        error: String,
    },

    /// The control loop received the quit signal
    Stopped,
}

impl Event {
    pub(crate) fn poll_failed(error: &crate::Error) -> Self {
        Event::PollFailed {
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn record_failed(error: &crate::error::RecordError) -> Self {
        Event::RecordFailed {
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn handle_failed(error: &crate::Error) -> Self {
        Event::HandleFailed {
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn delete_failed(error: &crate::Error) -> Self {
        Event::DeleteFailed {
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }
}

/// Lock-free pipeline counters
#[derive(Debug, Default)]
pub struct ReaderStats {
    pub(crate) polls: AtomicU64,
    pub(crate) poll_failures: AtomicU64,
    pub(crate) messages_received: AtomicU64,
    pub(crate) records_emitted: AtomicU64,
    pub(crate) record_failures: AtomicU64,
    pub(crate) batches_abandoned: AtomicU64,
    pub(crate) deletes: AtomicU64,
    pub(crate) tokens_deleted: AtomicU64,
    pub(crate) delete_failures: AtomicU64,
}

impl ReaderStats {
    pub(crate) fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            record_failures: self.record_failures.load(Ordering::Relaxed),
            batches_abandoned: self.batches_abandoned.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            tokens_deleted: self.tokens_deleted.load(Ordering::Relaxed),
            delete_failures: self.delete_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`ReaderStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Successful polls
    pub polls: u64,
    /// Failed polls (transport or decode)
    pub poll_failures: u64,
    /// Messages received across all polls
    pub messages_received: u64,
    /// Records emitted to the sink
    pub records_emitted: u64,
    /// Messages or lines that failed to decode
    pub record_failures: u64,
    /// Batches abandoned under the abort-batch policy or on sink failure
    pub batches_abandoned: u64,
    /// Successful delete requests
    pub deletes: u64,
    /// Receipt handles deleted
    pub tokens_deleted: u64,
    /// Failed delete requests
    pub delete_failures: u64,
}
