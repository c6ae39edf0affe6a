//! Deleter: one batched delete request per call

use crate::client::{QueueClient, QueueRequests};
use crate::config::RetryConfig;
use crate::error::Result;
use crate::retry::with_retry;
use crate::types::ReceiptHandle;
use std::sync::Arc;

/// Acknowledges consumed messages by deleting them from the queue
#[derive(Clone)]
pub struct Deleter {
    client: Arc<dyn QueueClient>,
    requests: Arc<QueueRequests>,
    retry: RetryConfig,
}

impl Deleter {
    /// Create a deleter
    pub fn new(
        client: Arc<dyn QueueClient>,
        requests: Arc<QueueRequests>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            requests,
            retry,
        }
    }

    /// Delete every handle in a single request
    ///
    /// The request succeeds or fails as a whole; per-entry results in the
    /// response are not inspected. An empty slice issues no request.
    pub async fn delete(&self, handles: &[ReceiptHandle]) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = handles.len(), "deleting start");
        with_retry(&self.retry, || async move {
            self.client.delete_messages(&self.requests, handles).await
        })
        .await?;
        tracing::debug!(count = handles.len(), "deleting complete");
        Ok(())
    }
}
