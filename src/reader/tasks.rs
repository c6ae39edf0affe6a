//! Poll, handle and delete task bodies.
//!
//! Each spawn function returns immediately. The spawned task reports its
//! result back to the control loop over a channel, or logs, counts and drops
//! it.

use super::{Delivered, TaskContext};
use crate::error::Error;
use crate::types::{Event, ReaderStats, ReceiptHandle};
use std::sync::Arc;

/// Spawn one poll; a batch is delivered on success, the trigger is dropped on failure
pub(super) fn spawn_poll(ctx: &Arc<TaskContext>) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let permit = match &ctx.in_flight {
            Some(limit) => match Arc::clone(limit).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    tracing::error!(error = %e, "in-flight limiter closed, poll dropped");
                    return;
                }
            },
            None => None,
        };

        ctx.emit(Event::PollStarted);
        match ctx.poller.poll().await {
            Ok(batch) => {
                let messages = batch.len();
                ReaderStats::incr(&ctx.stats.polls, 1);
                ReaderStats::incr(&ctx.stats.messages_received, messages as u64);
                tracing::debug!(messages, "poll complete");
                ctx.emit(Event::Polled { messages });

                if ctx.batch_tx.send(Delivered { batch, permit }).is_err() {
                    tracing::debug!(messages, "reader stopped, batch dropped");
                }
            }
            Err(e) => {
                ReaderStats::incr(&ctx.stats.poll_failures, 1);
                tracing::warn!(error = %e, kind = e.kind(), "poll failed, trigger dropped");
                ctx.emit(Event::poll_failed(&e));
            }
        }
    });
}

/// Spawn the handler for a delivered batch
///
/// An empty batch spawns nothing and only fires the next poll-trigger.
pub(super) fn spawn_handle(ctx: &Arc<TaskContext>, delivered: Delivered) {
    if delivered.batch.is_empty() {
        tracing::debug!("empty batch, polling again");
        drop(delivered);
        ctx.request_poll();
        return;
    }

    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let Delivered { batch, permit } = delivered;

        // Next poll goes out before this batch is decoded
        ctx.request_poll();

        let result = ctx.handler.handle(&batch, ctx.sink.as_ref()).await;
        drop(permit);

        match result {
            Ok(outcome) => {
                let failed = outcome.failed_messages(batch.len());
                ReaderStats::incr(&ctx.stats.records_emitted, outcome.records as u64);
                ReaderStats::incr(&ctx.stats.record_failures, outcome.failures.len() as u64);
                for failure in &outcome.failures {
                    ctx.emit(Event::record_failed(failure));
                }
                tracing::debug!(
                    messages = batch.len(),
                    records = outcome.records,
                    failed,
                    "batch handled"
                );
                ctx.emit(Event::Handled {
                    messages: batch.len(),
                    records: outcome.records,
                    failed,
                });

                if outcome.ack.is_empty() {
                    return;
                }
                if ctx.delete_tx.send(outcome.ack).is_err() {
                    tracing::debug!("reader stopped, receipt handles dropped");
                }
            }
            Err(e) => {
                if matches!(e, Error::Record(_)) {
                    ReaderStats::incr(&ctx.stats.record_failures, 1);
                }
                ReaderStats::incr(&ctx.stats.batches_abandoned, 1);
                tracing::warn!(
                    error = %e,
                    kind = e.kind(),
                    messages = batch.len(),
                    "handling failed, batch left on the queue"
                );
                ctx.emit(Event::handle_failed(&e));
            }
        }
    });
}

/// Spawn one delete request for `handles`; failures are dropped
pub(super) fn spawn_delete(ctx: &Arc<TaskContext>, handles: Vec<ReceiptHandle>) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let count = handles.len();
        match ctx.deleter.delete(&handles).await {
            Ok(()) => {
                ReaderStats::incr(&ctx.stats.deletes, 1);
                ReaderStats::incr(&ctx.stats.tokens_deleted, count as u64);
                ctx.emit(Event::Deleted { count });
            }
            Err(e) => {
                ReaderStats::incr(&ctx.stats.delete_failures, 1);
                tracing::warn!(error = %e, kind = e.kind(), count, "delete failed, dropped");
                ctx.emit(Event::delete_failed(&e));
            }
        }
    });
}
