//! Shared fixtures for unit tests: queue responses, envelopes, an in-memory
//! queue client and a sink that blocks until released.

use crate::client::QueueClient;
use crate::error::{Error, Result};
use crate::sink::{ChannelSink, RecordSink};
use crate::types::{Batch, DecodedRecord, ReceiptHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

/// How long a test waits for something that should happen
pub(crate) const WAIT: Duration = Duration::from_secs(5);

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A `ReceiveMessage` response holding `(body, receipt_handle)` pairs
pub(crate) fn receive_response(messages: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0"?><ReceiveMessageResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/"><ReceiveMessageResult>"#,
    );
    for (i, (body, handle)) in messages.iter().enumerate() {
        xml.push_str(&format!(
            "<Message><MessageId>id-{i}</MessageId><ReceiptHandle>{}</ReceiptHandle>\
             <MD5OfBody>00000000000000000000000000000000</MD5OfBody><Body>{}</Body>\
             <Attribute><Name>SenderId</Name><Value>AIDA</Value></Attribute></Message>",
            escape(handle),
            escape(body),
        ));
    }
    xml.push_str(
        "</ReceiveMessageResult><ResponseMetadata><RequestId>req-1</RequestId>\
         </ResponseMetadata></ReceiveMessageResponse>",
    );
    xml
}

/// A notification body whose `Message` field holds `lines` joined by newlines
pub(crate) fn envelope(lines: &[&str]) -> String {
    serde_json::json!({
        "Type": "Notification",
        "Message": lines.join("\n"),
    })
    .to_string()
}

/// A batch of `bodies` with receipt handles `h0`, `h1`, ...
pub(crate) fn batch_of(bodies: &[String]) -> Batch {
    Batch::new(bodies.to_vec(), handles(bodies.len())).unwrap()
}

/// Receipt handles `h0` to `h{n-1}`
pub(crate) fn handles(n: usize) -> Vec<ReceiptHandle> {
    (0..n).map(|i| ReceiptHandle::new(format!("h{i}"))).collect()
}

/// Receipt handles built from literals
pub(crate) fn handle_list(names: &[&str]) -> Vec<ReceiptHandle> {
    names.iter().copied().map(ReceiptHandle::from).collect()
}

/// Everything currently buffered in `rx`, as JSON values
pub(crate) fn drain_now(rx: &mut mpsc::Receiver<DecodedRecord>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(record) = rx.try_recv() {
        out.push(serde_json::Value::Object(record));
    }
    out
}

/// Receive the next item or fail the test after [`WAIT`]
pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

/// Request seen by [`FakeQueueClient`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Receive,
    Delete(Vec<ReceiptHandle>),
}

/// In-memory queue client
///
/// Receives are answered from a script in order; once the script runs out a
/// receive never completes. Every request is logged before it is answered.
pub(crate) struct FakeQueueClient {
    receives: Mutex<VecDeque<Result<String>>>,
    fail_deletes: bool,
    calls: mpsc::UnboundedSender<Call>,
}

impl FakeQueueClient {
    pub(crate) fn scripted(
        receives: Vec<Result<String>>,
    ) -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (calls, rx) = mpsc::unbounded_channel();
        let client = Self {
            receives: Mutex::new(receives.into()),
            fail_deletes: false,
            calls,
        };
        (client, rx)
    }

    pub(crate) fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }
}

#[async_trait]
impl QueueClient for FakeQueueClient {
    async fn get(&self, url: &Url) -> Result<Bytes> {
        let action = url
            .query_pairs()
            .find(|(k, _)| k == "Action")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        match action.as_str() {
            "ReceiveMessage" => {
                self.calls.send(Call::Receive).ok();
                let next = self.receives.lock().unwrap().pop_front();
                match next {
                    Some(response) => response.map(Bytes::from),
                    None => std::future::pending().await,
                }
            }
            "DeleteMessageBatch" => {
                let handles = url
                    .query_pairs()
                    .filter(|(k, _)| k.ends_with(".ReceiptHandle"))
                    .map(|(_, v)| ReceiptHandle::new(v.into_owned()))
                    .collect();
                self.calls.send(Call::Delete(handles)).ok();
                if self.fail_deletes {
                    return Err(Error::Http {
                        status: 500,
                        body: "InternalError".into(),
                    });
                }
                Ok(Bytes::from_static(b"<DeleteMessageBatchResponse/>"))
            }
            other => Err(Error::Other(format!("unexpected action {other:?}"))),
        }
    }
}

/// Sink that holds every record until its gate is opened
pub(crate) struct GatedSink {
    gate: watch::Receiver<bool>,
    inner: ChannelSink,
    entered: mpsc::UnboundedSender<()>,
}

impl GatedSink {
    /// A closed sink, the sender that opens it, its output and a signal fired
    /// each time a record reaches the gate
    pub(crate) fn closed(
        buffer: usize,
    ) -> (
        Self,
        watch::Sender<bool>,
        mpsc::Receiver<DecodedRecord>,
        mpsc::UnboundedReceiver<()>,
    ) {
        let (gate_tx, gate) = watch::channel(false);
        let (inner, out) = ChannelSink::channel(buffer);
        let (entered, entered_rx) = mpsc::unbounded_channel();
        (
            Self {
                gate,
                inner,
                entered,
            },
            gate_tx,
            out,
            entered_rx,
        )
    }
}

#[async_trait]
impl RecordSink for GatedSink {
    async fn emit(&self, record: DecodedRecord) -> Result<()> {
        self.entered.send(()).ok();
        let mut gate = self.gate.clone();
        while !*gate.borrow_and_update() {
            gate.changed()
                .await
                .map_err(|_| Error::ShuttingDown("gate"))?;
        }
        self.inner.emit(record).await
    }
}
