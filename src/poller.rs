//! Poller: one receive request per call

use crate::client::{QueueClient, QueueRequests};
use crate::codec::decode_poll_response;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::Batch;
use std::sync::Arc;

/// Issues receive requests and decodes the responses
#[derive(Clone)]
pub struct Poller {
    client: Arc<dyn QueueClient>,
    requests: Arc<QueueRequests>,
    retry: RetryConfig,
}

impl Poller {
    /// Create a poller
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

    /// Receive one batch
    ///
    /// # Errors
    ///
    /// Transport failures and undecodable responses are returned to the
    /// caller. Retries happen only if the configured [`RetryConfig`] allows them.
    pub async fn poll(&self) -> Result<Batch> {
        tracing::debug!("polling start");
        let batch = with_retry(&self.retry, || async move {
            let body = self.client.receive_messages(&self.requests).await?;
            Ok::<_, Error>(decode_poll_response(&body)?)
        })
        .await?;
        tracing::debug!(messages = batch.len(), "polling complete");
        Ok(batch)
    }
}
