//! Common test utilities for sqs-reader integration tests

#![allow(dead_code)]

use sqs_reader::{Config, Event};
use std::time::Duration;
use tokio::sync::broadcast;

/// How long a test waits for the reader to do something
pub const WAIT: Duration = Duration::from_secs(10);

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Load a real queue configuration from environment variables
///
/// Required environment variables:
/// - `SQS_ENDPOINT` - Queue URL
/// - `AWS_ACCESS_KEY_ID` - Access key id
/// - `AWS_SECRET_ACCESS_KEY` - Secret access key
///
/// Optional environment variables:
/// - `AWS_REGION` - Signing region (default: inferred from the queue URL)
pub fn load_live_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let var = |name: &str| {
        std::env::var(name).map_err(|_| ConfigError(format!("{name} not set in environment")))
    };

    let mut config = Config::new(
        var("SQS_ENDPOINT")?,
        var("AWS_ACCESS_KEY_ID")?,
        var("AWS_SECRET_ACCESS_KEY")?,
    );
    config.queue.region = std::env::var("AWS_REGION").ok();
    config.queue.wait_time_seconds = 5;
    Ok(config)
}

/// A `ReceiveMessage` response holding `(body, receipt_handle)` pairs
pub fn receive_response(messages: &[(&str, &str)]) -> String {
    let escape = |s: &str| {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    };

    let mut xml = String::from("<ReceiveMessageResponse><ReceiveMessageResult>");
    for (body, handle) in messages {
        xml.push_str(&format!(
            "<Message><ReceiptHandle>{}</ReceiptHandle><Body>{}</Body></Message>",
            escape(handle),
            escape(body)
        ));
    }
    xml.push_str(
        "</ReceiveMessageResult><ResponseMetadata><RequestId>test</RequestId>\
         </ResponseMetadata></ReceiveMessageResponse>",
    );
    xml
}

/// A notification body carrying `lines` in its `Message` field
pub fn envelope(lines: &[&str]) -> String {
    serde_json::json!({ "Type": "Notification", "Message": lines.join("\n") }).to_string()
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
