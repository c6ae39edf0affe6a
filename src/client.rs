//! Queue client boundary
//!
//! Both queue operations are signed `GET` requests against the configured
//! endpoint, with every parameter in the query string:
//!
//! - receive: `Action=ReceiveMessage`, `AttributeName=All`,
//!   `MaxNumberOfMessages`, `WaitTimeSeconds`
//! - delete: `Action=DeleteMessageBatch` plus one indexed
//!   `(Id, ReceiptHandle)` pair per receipt handle
//!
//! [`QueueRequests`] builds those URLs deterministically. [`QueueClient`] is
//! the transport seam; [`HttpQueueClient`] is the reqwest implementation.

use crate::config::{Config, QueueConfig};
use crate::error::{Error, Result};
use crate::signing::{RequestSigner, signer_for};
use crate::types::ReceiptHandle;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use url::Url;

/// Longest response body kept in an [`Error::Http`]
const MAX_ERROR_BODY: usize = 512;

/// Prefix of the per-entry delete parameters
const DELETE_ENTRY: &str = "DeleteMessageBatchRequestEntry";

/// Builds the request URLs for one queue
#[derive(Clone, Debug)]
pub struct QueueRequests {
    endpoint: Url,
    api_version: String,
    signature_version: String,
    wait_time_seconds: u32,
    max_messages: u32,
}

impl QueueRequests {
    /// Request builder for the configured queue
    pub fn new(config: &QueueConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint_url()?,
            api_version: config.api_version.clone(),
            signature_version: config.signature_version.clone(),
            wait_time_seconds: config.wait_time_seconds,
            max_messages: config.max_messages,
        })
    }

    /// The queue endpoint without a query string
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL receiving up to `max_messages`, waiting up to `wait_time_seconds`,
    /// with all attributes
    pub fn receive_url(&self) -> Url {
        let wait = self.wait_time_seconds.to_string();
        let max = self.max_messages.to_string();
        self.with_query(&[
            ("Action", "ReceiveMessage"),
            ("AttributeName", "All"),
            ("MaxNumberOfMessages", &max),
            ("SignatureVersion", &self.signature_version),
            ("Version", &self.api_version),
            ("WaitTimeSeconds", &wait),
        ])
    }

    /// URL deleting every handle in one batch request
    ///
    /// Entries are numbered from 1 in the order given and get the id
    /// `msg<n>`, unique within the request.
    pub fn delete_url(&self, handles: &[ReceiptHandle]) -> Url {
        let mut entries = Vec::with_capacity(handles.len() * 2);
        for (i, handle) in handles.iter().enumerate() {
            let n = i + 1;
            entries.push((format!("{DELETE_ENTRY}.{n}.Id"), format!("msg{n}")));
            entries.push((
                format!("{DELETE_ENTRY}.{n}.ReceiptHandle"),
                handle.as_str().to_string(),
            ));
        }

        let mut params: Vec<(&str, &str)> = vec![("Action", "DeleteMessageBatch")];
        params.extend(entries.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        params.push(("SignatureVersion", &self.signature_version));
        params.push(("Version", &self.api_version));
        self.with_query(&params)
    }

    fn with_query(&self, params: &[(&str, &str)]) -> Url {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));
        url
    }
}

/// Transport for queue requests
///
/// Implementations must be safe to share between concurrently running
/// poll and delete tasks.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Issue an authenticated `GET` and return the response body
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] on network failure, [`Error::Http`] on a non-2xx
    /// status.
    async fn get(&self, url: &Url) -> Result<Bytes>;

    /// Receive a batch of raw messages
    async fn receive_messages(&self, requests: &QueueRequests) -> Result<Bytes> {
        self.get(&requests.receive_url()).await
    }

    /// Delete messages by receipt handle
    async fn delete_messages(
        &self,
        requests: &QueueRequests,
        handles: &[ReceiptHandle],
    ) -> Result<Bytes> {
        self.get(&requests.delete_url(handles)).await
    }
}

/// reqwest-backed queue client
pub struct HttpQueueClient {
    http: reqwest::Client,
    signer: Arc<dyn RequestSigner>,
}

impl HttpQueueClient {
    /// Create a client with the signer implied by the configured credentials
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or no signing
    /// region can be determined
    pub fn new(config: &Config) -> Result<Self> {
        let signer = signer_for(config)?;
        Self::with_signer(config, signer)
    }

    /// Create a client with an explicit signer
    pub fn with_signer(config: &Config, signer: Arc<dyn RequestSigner>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.queue.request_timeout)
            .user_agent(concat!("sqs-reader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        tracing::debug!(signer = signer.name(), "queue client created");
        Ok(Self { http, signer })
    }
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn get(&self, url: &Url) -> Result<Bytes> {
        let headers = self.signer.sign(url, Utc::now())?;
        let response = self.http.get(url.clone()).headers(headers).send().await?;

        // Check HTTP status before handing the body to a decoder
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Unsigned;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requests(endpoint: &str) -> QueueRequests {
        let config = QueueConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        };
        QueueRequests::new(&config).unwrap()
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn receive_url_carries_all_parameters() {
        let url = requests("https://sqs.us-east-1.amazonaws.com/1/q?").receive_url();
        assert_eq!(url.path(), "/1/q");
        assert_eq!(
            url.query(),
            Some(
                "Action=ReceiveMessage&AttributeName=All&MaxNumberOfMessages=10\
                 &SignatureVersion=4&Version=2012-11-05&WaitTimeSeconds=0"
            )
        );
    }

    #[test]
    fn delete_url_numbers_entries_from_one() {
        let handles = vec![ReceiptHandle::new("AQE+a/b="), ReceiptHandle::new("h2")];
        let url = requests("https://sqs.us-east-1.amazonaws.com/1/q").delete_url(&handles);

        assert_eq!(
            pairs(&url),
            vec![
                ("Action".into(), "DeleteMessageBatch".into()),
                ("DeleteMessageBatchRequestEntry.1.Id".into(), "msg1".into()),
                (
                    "DeleteMessageBatchRequestEntry.1.ReceiptHandle".into(),
                    "AQE+a/b=".into()
                ),
                ("DeleteMessageBatchRequestEntry.2.Id".into(), "msg2".into()),
                ("DeleteMessageBatchRequestEntry.2.ReceiptHandle".into(), "h2".into()),
                ("SignatureVersion".into(), "4".into()),
                ("Version".into(), "2012-11-05".into()),
            ]
        );
        // '+' must survive the round trip instead of turning into a space
        assert!(url.query().unwrap().contains("AQE%2Ba%2Fb%3D"));
    }

    #[test]
    fn delete_url_is_deterministic_with_unique_ids() {
        let reqs = requests("https://sqs.us-east-1.amazonaws.com/1/q");
        let handles: Vec<_> = (0..10).map(|i| ReceiptHandle::new(format!("h{i}"))).collect();

        let first = reqs.delete_url(&handles);
        assert_eq!(first, reqs.delete_url(&handles));

        let ids: Vec<_> = pairs(&first)
            .into_iter()
            .filter(|(k, _)| k.ends_with(".Id"))
            .map(|(_, v)| v)
            .collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn http_client_returns_body_on_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1/q"))
            .and(query_param("Action", "ReceiveMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = Config::new(format!("{}/1/q", mock_server.uri()), "", "");
        let client = HttpQueueClient::new(&config).unwrap();
        let reqs = QueueRequests::new(&config.queue).unwrap();

        let body = client.receive_messages(&reqs).await.unwrap();
        assert_eq!(&body[..], b"<ok/>");
    }

    #[tokio::test]
    async fn http_client_maps_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
            .mount(&mock_server)
            .await;

        let config = Config::new(mock_server.uri(), "", "");
        let client = HttpQueueClient::with_signer(&config, Arc::new(Unsigned)).unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();

        match client.get(&url).await {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "SignatureDoesNotMatch");
            }
            other => panic!("expected HTTP error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_client_attaches_signature_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = Config::new(format!("{}/1/q", mock_server.uri()), "key", "secret");
        config.queue.region = Some("us-east-1".into());
        let client = HttpQueueClient::new(&config).unwrap();
        let reqs = QueueRequests::new(&config.queue).unwrap();

        client
            .delete_messages(&reqs, &[ReceiptHandle::new("h")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let config = Config::new("http://127.0.0.1:9/1/q", "", "");
        let client = HttpQueueClient::new(&config).unwrap();
        let reqs = QueueRequests::new(&config.queue).unwrap();

        let err = client.receive_messages(&reqs).await.unwrap_err();
        assert_eq!(err.kind(), "transport_error");
    }
}
