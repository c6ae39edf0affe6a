//! Envelope codec
//!
//! Two decoding steps live here:
//!
//! 1. [`decode_poll_response`] turns a raw `ReceiveMessage` response into a
//!    [`Batch`] of bodies and receipt handles.
//! 2. [`decode_envelope`] peels a message body: the body is a JSON object whose
//!    `Message` field holds a string, and that string is newline-delimited JSON
//!    with one record per non-empty line.
//!
//! Outer failures are [`DecodeError`]s and cost the whole poll. Inner failures
//! are [`RecordError`]s scoped to one message (or one line, under
//! [`LinePolicy::SkipLine`]).

use crate::config::LinePolicy;
use crate::error::{DecodeError, RecordError};
use crate::types::{Batch, DecodedRecord, ReceiptHandle};
use serde::Deserialize;

/// Body field that carries the serialized inner payload
pub const ENVELOPE_FIELD: &str = "Message";

#[derive(Debug, Deserialize)]
struct ReceiveMessageResponse {
    #[serde(rename = "ReceiveMessageResult")]
    result: ReceiveMessageResult,
}

#[derive(Debug, Default, Deserialize)]
struct ReceiveMessageResult {
    #[serde(rename = "Message", default)]
    messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
struct ReceivedMessage {
    #[serde(rename = "Body")]
    body: String,
    #[serde(rename = "ReceiptHandle")]
    receipt_handle: String,
}

/// Decode a `ReceiveMessage` response into a batch
///
/// Messages keep their response order, and each body stays paired with its
/// own receipt handle. Unknown elements (message ids, attributes, response
/// metadata) are ignored.
///
/// # Errors
///
/// Returns [`DecodeError::Xml`] if the bytes are not UTF-8 or do not match the
/// response schema.
pub fn decode_poll_response(bytes: &[u8]) -> Result<Batch, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Xml(format!("response is not UTF-8: {e}")))?;

    let response: ReceiveMessageResponse =
        quick_xml::de::from_str(text).map_err(|e| DecodeError::Xml(e.to_string()))?;

    let (bodies, handles): (Vec<String>, Vec<ReceiptHandle>) = response
        .result
        .messages
        .into_iter()
        .map(|m| (m.body, ReceiptHandle(m.receipt_handle)))
        .unzip();

    let (body_count, handle_count) = (bodies.len(), handles.len());
    Batch::new(bodies, handles).ok_or(DecodeError::MisalignedBatch {
        bodies: body_count,
        handles: handle_count,
    })
}

/// Decode one message body into its records
///
/// `index` is the message's position in its batch and is carried into any
/// error. Records come back in line order. A failed envelope yields a single
/// error. Under [`LinePolicy::AbortMessage`] the first malformed line ends the
/// output (records before it are kept); under [`LinePolicy::SkipLine`] each
/// malformed line yields an error in place and decoding continues.
pub fn decode_envelope(
    index: usize,
    body: &str,
    policy: LinePolicy,
) -> Vec<Result<DecodedRecord, RecordError>> {
    let outer: DecodedRecord = match serde_json::from_str(body) {
        Ok(outer) => outer,
        Err(e) => {
            return vec![Err(RecordError::MalformedBody {
                index,
                reason: e.to_string(),
            })];
        }
    };

    let Some(inner) = outer.get(ENVELOPE_FIELD).and_then(|v| v.as_str()) else {
        return vec![Err(RecordError::CorruptedEnvelope { index })];
    };

    let mut out = Vec::new();
    for (n, line) in inner.split('\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DecodedRecord>(line) {
            Ok(record) => out.push(Ok(record)),
            Err(e) => {
                out.push(Err(RecordError::MalformedLine {
                    index,
                    line: n + 1,
                    reason: e.to_string(),
                }));
                if policy == LinePolicy::AbortMessage {
                    break;
                }
            }
        }
    }
    out
}

/// Decode every message of a batch, in message order then line order
///
/// Unlike the [`Handler`](crate::Handler), this never stops at a failing
/// message; batch-level policy is the handler's concern.
pub fn decode_records(
    batch: &Batch,
    policy: LinePolicy,
) -> Vec<Result<DecodedRecord, RecordError>> {
    batch
        .bodies()
        .iter()
        .enumerate()
        .flat_map(|(index, body)| decode_envelope(index, body, policy))
        .collect()
}
