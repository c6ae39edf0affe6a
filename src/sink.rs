//! Record sinks
//!
//! The handler pushes every decoded record into a [`RecordSink`]. The reader's
//! default sink is a [`ChannelSink`] whose receiving half is handed to the
//! caller as the output stream. [`JsonLinesWriter`] serialises records back to
//! one compact JSON object per line.

use crate::error::{Error, Result};
use crate::types::DecodedRecord;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

/// Consumer of decoded records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Accept one record
    ///
    /// # Errors
    ///
    /// A sink that can no longer accept records returns an error; the batch
    /// being handled is then abandoned and its messages are not deleted.
    async fn emit(&self, record: DecodedRecord) -> Result<()>;
}

/// Sink feeding a bounded channel
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<DecodedRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<DecodedRecord>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl From<mpsc::Sender<DecodedRecord>> for ChannelSink {
    fn from(tx: mpsc::Sender<DecodedRecord>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn emit(&self, record: DecodedRecord) -> Result<()> {
        self.tx
            .send(record)
            .await
            .map_err(|_| Error::ShuttingDown("record sink"))
    }
}

/// Writes each record as a line of compact JSON
pub struct JsonLinesWriter<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Write records from `rx` until the channel closes
    pub async fn drain(&self, mut rx: mpsc::Receiver<DecodedRecord>) -> Result<u64> {
        let mut written = 0;
        while let Some(record) = rx.recv().await {
            self.emit(record).await?;
            written += 1;
        }
        Ok(written)
    }
}

#[async_trait]
impl<W> RecordSink for JsonLinesWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, record: DecodedRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
