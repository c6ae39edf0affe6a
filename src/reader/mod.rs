//! The orchestrator: drives polling, handling and deletion as concurrent tasks.
//!
//! A single control loop selects over four channels:
//!
//! - poll-trigger: spawn a poll task
//! - delivered-batch: spawn a handler task, which requests the next poll
//!   before it decodes anything
//! - delete-tokens: spawn a delete task
//! - quit: leave the loop
//!
//! The loop never performs I/O itself. Task failures are logged, counted in
//! [`ReaderStats`] and broadcast as [`Event`]s, then dropped. A failed poll
//! does not requeue its trigger, so the poll chain ends there unless another
//! batch in flight or [`ReaderHandle::trigger_poll`] starts a new one.
//!
//! - [`tasks`] - the poll, handle and delete task bodies

mod tasks;

use crate::client::{HttpQueueClient, QueueClient, QueueRequests};
use crate::config::Config;
use crate::deleter::Deleter;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::poller::Poller;
use crate::sink::{ChannelSink, RecordSink};
use crate::types::{Batch, DecodedRecord, Event, ReaderStats, ReceiptHandle, StatsSnapshot};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, mpsc};

/// A polled batch on its way to the handler
///
/// When in-flight batches are bounded, the permit taken before polling travels
/// with the batch and is released once handling finishes.
pub(crate) struct Delivered {
    pub(crate) batch: Batch,
    pub(crate) permit: Option<OwnedSemaphorePermit>,
}

/// State shared by every spawned task
pub(crate) struct TaskContext {
    pub(crate) poller: Poller,
    pub(crate) handler: Handler,
    pub(crate) deleter: Deleter,
    pub(crate) sink: Arc<dyn RecordSink>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) stats: Arc<ReaderStats>,
    pub(crate) poll_tx: mpsc::UnboundedSender<()>,
    pub(crate) batch_tx: mpsc::UnboundedSender<Delivered>,
    pub(crate) delete_tx: mpsc::UnboundedSender<Vec<ReceiptHandle>>,
    /// Bounds batches between poll start and handling end (None = unbounded)
    pub(crate) in_flight: Option<Arc<Semaphore>>,
}

impl TaskContext {
    /// Broadcast an event; having no subscribers is not an error
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Fire a poll-trigger at the control loop
    pub(crate) fn request_poll(&self) {
        if self.poll_tx.send(()).is_err() {
            tracing::debug!("reader stopped, poll trigger dropped");
        }
    }
}

/// Pipelined queue consumer
///
/// Build with [`Reader::new`] (HTTP queue, channel output) or
/// [`Reader::with_parts`] (any client and sink), then drive it with
/// [`Reader::run`]. Control it from elsewhere through a [`ReaderHandle`].
pub struct Reader {
    ctx: Arc<TaskContext>,
    poll_rx: mpsc::UnboundedReceiver<()>,
    batch_rx: mpsc::UnboundedReceiver<Delivered>,
    delete_rx: mpsc::UnboundedReceiver<Vec<ReceiptHandle>>,
    quit_tx: mpsc::Sender<()>,
    quit_rx: mpsc::Receiver<()>,
}

impl Reader {
    /// Create a reader for the configured queue
    ///
    /// Returns the reader and the stream of decoded records. Records are
    /// buffered up to `pipeline.record_buffer`; a full buffer holds back
    /// handling, and a dropped receiver makes every later batch fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<(Self, mpsc::Receiver<DecodedRecord>)> {
        config.validate()?;
        let client = Arc::new(HttpQueueClient::new(&config)?);
        let (sink, records) = ChannelSink::channel(config.pipeline.record_buffer);
        let reader = Self::with_parts(&config, client, Arc::new(sink))?;
        Ok((reader, records))
    }

    /// Create a reader from an explicit queue client and record sink
    pub fn with_parts(
        config: &Config,
        client: Arc<dyn QueueClient>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self> {
        config.validate()?;
        let requests = Arc::new(QueueRequests::new(&config.queue)?);

        let (event_tx, _) = broadcast::channel(config.pipeline.event_buffer);
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (delete_tx, delete_rx) = mpsc::unbounded_channel();
        let (quit_tx, quit_rx) = mpsc::channel(1);

        let ctx = TaskContext {
            poller: Poller::new(
                Arc::clone(&client),
                Arc::clone(&requests),
                config.poll_retry.clone(),
            ),
            handler: Handler::new(config.pipeline.line_policy, config.pipeline.batch_policy),
            deleter: Deleter::new(client, requests, config.delete_retry.clone()),
            sink,
            event_tx,
            stats: Arc::new(ReaderStats::default()),
            poll_tx,
            batch_tx,
            delete_tx,
            in_flight: config
                .pipeline
                .max_batches_in_flight
                .map(|n| Arc::new(Semaphore::new(n))),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            poll_rx,
            batch_rx,
            delete_rx,
            quit_tx,
            quit_rx,
        })
    }

    /// A cloneable handle for stopping, re-seeding and observing the reader
    pub fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            poll_tx: self.ctx.poll_tx.clone(),
            quit_tx: self.quit_tx.clone(),
            event_tx: self.ctx.event_tx.clone(),
            stats: Arc::clone(&self.ctx.stats),
        }
    }

    /// Subscribe to reader events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.event_tx.subscribe()
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Run the control loop until [`ReaderHandle::stop`] is called
    ///
    /// A first poll-trigger is fired on entry. On quit the loop exits at once;
    /// tasks already spawned run to completion but nothing new is scheduled.
    pub async fn run(self) {
        let Reader {
            ctx,
            mut poll_rx,
            mut batch_rx,
            mut delete_rx,
            // Held so the quit channel stays open with no handles around
            quit_tx: _quit_tx,
            mut quit_rx,
        } = self;

        tracing::info!(
            bounded = ?ctx.in_flight.as_ref().map(|s| s.available_permits()),
            "reader started"
        );
        ctx.request_poll();

        loop {
            tokio::select! {
                biased;

                _ = quit_rx.recv() => break,
                Some(()) = poll_rx.recv() => tasks::spawn_poll(&ctx),
                Some(delivered) = batch_rx.recv() => tasks::spawn_handle(&ctx, delivered),
                Some(handles) = delete_rx.recv() => tasks::spawn_delete(&ctx, handles),
            }
        }

        tracing::info!("reader stopped");
        ctx.emit(Event::Stopped);
    }
}

/// Control surface for a running [`Reader`]
#[derive(Clone)]
pub struct ReaderHandle {
    poll_tx: mpsc::UnboundedSender<()>,
    quit_tx: mpsc::Sender<()>,
    event_tx: broadcast::Sender<Event>,
    stats: Arc<ReaderStats>,
}

impl ReaderHandle {
    /// Send the quit signal
    ///
    /// In-flight tasks are not drained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the control loop has already exited.
    pub async fn stop(&self) -> Result<()> {
        self.quit_tx
            .send(())
            .await
            .map_err(|_| Error::ShuttingDown("reader"))
    }

    /// Inject a poll-trigger
    ///
    /// Restarts polling after a failed poll has ended the chain. Each call
    /// adds one more poll chain, so call it only once polling has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the control loop has already exited.
    pub fn trigger_poll(&self) -> Result<()> {
        self.poll_tx
            .send(())
            .map_err(|_| Error::ShuttingDown("reader"))
    }

    /// Subscribe to reader events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
