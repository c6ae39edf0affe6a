//! Handler: decode a polled batch and feed the sink
//!
//! Records are emitted in message order, then line order within a message.
//! What happens after a decode failure depends on two policies:
//!
//! | | [`BatchPolicy::AbortBatch`] | [`BatchPolicy::Isolate`] |
//! |---|---|---|
//! | failed message | `handle` returns the error | skipped, handle withheld |
//! | later messages | not handled | handled |
//! | deletion | none for the batch | every clean message |
//!
//! A message fails when its envelope is broken, or when a line is malformed
//! under [`LinePolicy::AbortMessage`]. Under [`LinePolicy::SkipLine`] a
//! malformed line is reported and dropped, and the message still counts as
//! clean. Records decoded before a failure are emitted either way.

use crate::codec::decode_envelope;
use crate::config::{BatchPolicy, LinePolicy};
use crate::error::{RecordError, Result};
use crate::sink::RecordSink;
use crate::types::{Batch, ReceiptHandle};

/// Result of handling one batch
#[derive(Debug, Default)]
pub struct HandleOutcome {
    /// Records emitted to the sink
    pub records: usize,
    /// Receipt handles of messages that decoded cleanly, in batch order
    pub ack: Vec<ReceiptHandle>,
    /// Failures that were skipped rather than aborting the batch
    pub failures: Vec<RecordError>,
}

impl HandleOutcome {
    /// Number of messages withheld from deletion
    pub fn failed_messages(&self, batch_len: usize) -> usize {
        batch_len - self.ack.len()
    }
}

/// Applies the envelope codec to batches
#[derive(Clone, Copy, Debug, Default)]
pub struct Handler {
    line_policy: LinePolicy,
    batch_policy: BatchPolicy,
}

impl Handler {
    /// Create a handler with the given failure policies
    pub fn new(line_policy: LinePolicy, batch_policy: BatchPolicy) -> Self {
        Self {
            line_policy,
            batch_policy,
        }
    }

    /// Decode every message in `batch` and emit its records to `sink`
    ///
    /// # Errors
    ///
    /// Under [`BatchPolicy::AbortBatch`] the first failed message is returned
    /// as [`Error::Record`](crate::Error::Record). A sink error is returned
    /// under either policy.
    pub async fn handle(&self, batch: &Batch, sink: &dyn RecordSink) -> Result<HandleOutcome> {
        tracing::debug!(messages = batch.len(), "handling start");
        let mut outcome = HandleOutcome::default();

        for (index, (body, handle)) in batch
            .bodies()
            .iter()
            .zip(batch.receipt_handles())
            .enumerate()
        {
            let mut clean = true;
            for decoded in decode_envelope(index, body, self.line_policy) {
                match decoded {
                    Ok(record) => {
                        sink.emit(record).await?;
                        outcome.records += 1;
                    }
                    Err(e) => {
                        let fails_message = !matches!(
                            (&e, self.line_policy),
                            (RecordError::MalformedLine { .. }, LinePolicy::SkipLine)
                        );
                        if fails_message && self.batch_policy == BatchPolicy::AbortBatch {
                            return Err(e.into());
                        }
                        tracing::warn!(error = %e, "skipping undecodable record");
                        clean &= !fails_message;
                        outcome.failures.push(e);
                    }
                }
            }
            if clean {
                outcome.ack.push(handle.clone());
            }
        }

        tracing::debug!(
            records = outcome.records,
            failures = outcome.failures.len(),
            "handling complete"
        );
        Ok(outcome)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sink::ChannelSink;
    use crate::test_helpers::{batch_of, drain_now, envelope, handle_list};
    use serde_json::json;

    fn mixed_batch() -> Batch {
        batch_of(&[
            envelope(&[r#"{"m":0}"#]),
            r#"{"Subject":"no message field"}"#.to_string(),
            envelope(&[r#"{"m":2,"l":0}"#, "garbage", r#"{"m":2,"l":2}"#]),
            envelope(&[r#"{"m":3}"#]),
        ])
    }

    #[tokio::test]
    async fn emits_every_record_in_message_then_line_order() {
        let batch = batch_of(&[
            envelope(&[r#"{"a":1}"#, r#"{"b":2}"#]),
            envelope(&[r#"{"c":3}"#]),
        ]);
        let (sink, mut rx) = ChannelSink::channel(16);

        let outcome = Handler::default().handle(&batch, &sink).await.unwrap();

        assert_eq!(outcome.records, 3);
        assert_eq!(outcome.ack, handle_list(&["h0", "h1"]));
        assert!(outcome.failures.is_empty());
        assert_eq!(
            drain_now(&mut rx),
            vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]
        );
    }

    #[tokio::test]
    async fn abort_batch_stops_at_the_first_failed_message() {
        let (sink, mut rx) = ChannelSink::channel(16);
        let handler = Handler::new(LinePolicy::AbortMessage, BatchPolicy::AbortBatch);

        let err = handler.handle(&mixed_batch(), &sink).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Record(RecordError::CorruptedEnvelope { index: 1 })
        ));
        // Only the message ahead of the corrupted one reached the sink
        assert_eq!(drain_now(&mut rx), vec![json!({"m": 0})]);
    }

    #[tokio::test]
    async fn isolate_keeps_handling_and_acks_clean_messages() {
        let (sink, mut rx) = ChannelSink::channel(16);
        let handler = Handler::new(LinePolicy::AbortMessage, BatchPolicy::Isolate);

        let outcome = handler.handle(&mixed_batch(), &sink).await.unwrap();

        assert_eq!(outcome.ack, handle_list(&["h0", "h3"]));
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failed_messages(4), 2);
        assert_eq!(
            drain_now(&mut rx),
            vec![json!({"m": 0}), json!({"m": 2, "l": 0}), json!({"m": 3})]
        );
    }

    #[tokio::test]
    async fn skip_line_keeps_siblings_and_acks_the_message() {
        let (sink, mut rx) = ChannelSink::channel(16);
        let handler = Handler::new(LinePolicy::SkipLine, BatchPolicy::Isolate);

        let outcome = handler.handle(&mixed_batch(), &sink).await.unwrap();

        assert_eq!(outcome.ack, handle_list(&["h0", "h2", "h3"]));
        assert_eq!(outcome.records, 4);
        assert!(matches!(
            outcome.failures.as_slice(),
            [
                RecordError::CorruptedEnvelope { index: 1 },
                RecordError::MalformedLine { index: 2, line: 2, .. }
            ]
        ));
        assert_eq!(
            drain_now(&mut rx),
            vec![
                json!({"m": 0}),
                json!({"m": 2, "l": 0}),
                json!({"m": 2, "l": 2}),
                json!({"m": 3})
            ]
        );
    }

    #[tokio::test]
    async fn closed_sink_fails_the_batch() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        let batch = batch_of(&[envelope(&[r#"{"a":1}"#])]);

        let err = Handler::default().handle(&batch, &sink).await.unwrap_err();
        assert!(matches!(err, Error::ShuttingDown(_)));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (sink, mut rx) = ChannelSink::channel(1);
        let outcome = Handler::default()
            .handle(&Batch::default(), &sink)
            .await
            .unwrap();
        assert_eq!(outcome.records, 0);
        assert!(outcome.ack.is_empty());
        assert!(drain_now(&mut rx).is_empty());
    }
}
