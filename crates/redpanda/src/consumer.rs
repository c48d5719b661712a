//! Batching stream consumer.
//!
//! Reads one message at a time from a [`MessageSource`] and hands batches to
//! a [`BatchHandler`]. A batch is flushed when it reaches `batch_size`
//! messages or when the flush period elapses, whichever comes first.
//! Offsets are committed after the handler returns unless it reports
//! cancellation, in which case the batch stays uncommitted for redelivery.

use crate::batch::MessageBatch;
use crate::config::ConsumerConfig;
use async_trait::async_trait;
use engine_core::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A message read from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl ConsumedMessage {
    /// Payload as text; invalid UTF-8 is replaced rather than rejected.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Wire-level read/commit primitive.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits up to `timeout` for the next message. `Ok(None)` means the wait
    /// timed out.
    async fn read(&mut self, timeout: Duration) -> Result<Option<ConsumedMessage>>;

    /// Marks `message` as processed.
    async fn commit(&mut self, message: &ConsumedMessage) -> Result<()>;

    /// Releases the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Processes one flushed batch of raw payloads.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, token: &CancellationToken, payloads: Vec<String>) -> Result<()>;
}

/// Drives a [`MessageSource`] through a [`BatchHandler`] on a background task.
pub struct StreamConsumer {
    config: ConsumerConfig,
    token: CancellationToken,
    source: Mutex<Option<Box<dyn MessageSource>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConsumer {
    pub fn new(
        source: Box<dyn MessageSource>,
        config: ConsumerConfig,
        token: CancellationToken,
    ) -> Self {
        info!(
            group_id = %config.group_id,
            topics = ?config.topics,
            batch_size = config.batch_size,
            flush_period_ms = config.flush_period_ms,
            "Creating stream consumer"
        );

        Self {
            config,
            token,
            source: Mutex::new(Some(source)),
            task: Mutex::new(None),
        }
    }

    /// Starts the consume loop. Only the first call has any effect.
    pub fn consume(&self, handler: Arc<dyn BatchHandler>) {
        let Some(source) = self.source.lock().take() else {
            warn!("Consumer already started");
            return;
        };

        let config = self.config.clone();
        let token = self.token.clone();
        let handle = tokio::spawn(run(source, handler, config, token));
        *self.task.lock() = Some(handle);
    }

    /// Cancels the shared token and waits for the loop to exit and close
    /// its source.
    pub async fn stop(&self) {
        self.token.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Consumer task failed");
            }
        }

        // Never started: the source is still ours to close.
        let source = self.source.lock().take();
        if let Some(mut source) = source {
            if let Err(e) = source.close().await {
                error!(error = %e, "Failed to close consumer source");
            }
        }

        info!("Consumer stopped");
    }
}

async fn run(
    mut source: Box<dyn MessageSource>,
    handler: Arc<dyn BatchHandler>,
    config: ConsumerConfig,
    token: CancellationToken,
) {
    let period = config.flush_period();
    let mut batch = MessageBatch::new(config.batch_size);
    let mut deadline = Instant::now() + period;

    loop {
        if token.is_cancelled() {
            break;
        }

        if Instant::now() >= deadline {
            if !batch.is_empty() {
                debug!(size = batch.len(), "Flushing batch on period");
                flush(source.as_mut(), handler.as_ref(), &mut batch, &token).await;
            }
            deadline = Instant::now() + period;
            continue;
        }

        match source.read(period).await {
            Ok(Some(message)) => {
                metrics().messages_consumed.inc();
                if batch.push(message) {
                    debug!(size = batch.len(), "Flushing full batch");
                    flush(source.as_mut(), handler.as_ref(), &mut batch, &token).await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                metrics().consumer_read_errors.inc();
                error!(error = %e, "Failed to read message");
            }
        }
    }

    if !batch.is_empty() {
        info!(pending = batch.len(), "Consumer exiting with unflushed messages");
    }

    if let Err(e) = source.close().await {
        error!(error = %e, "Failed to close consumer source");
    }
    info!("Consume loop exited");
}

async fn flush(
    source: &mut dyn MessageSource,
    handler: &dyn BatchHandler,
    batch: &mut MessageBatch,
    token: &CancellationToken,
) {
    let messages = batch.take();
    let payloads = messages.iter().map(ConsumedMessage::payload_str).collect();
    metrics().batches_flushed.inc();

    match handler.handle(token, payloads).await {
        Err(e) if e.is_canceled() => {
            metrics().batches_canceled.inc();
            info!(size = messages.len(), "Batch canceled, offsets left uncommitted");
            return;
        }
        Err(e) => {
            error!(size = messages.len(), error = %e, "Batch handler failed");
        }
        Ok(()) => {}
    }

    if commit_all(source, &messages).await {
        metrics().batches_committed.inc();
    }
}

/// Commits every message; true only when none of the commits failed.
async fn commit_all(source: &mut dyn MessageSource, messages: &[ConsumedMessage]) -> bool {
    let mut all_committed = true;
    for message in messages {
        if let Err(e) = source.commit(message).await {
            all_committed = false;
            metrics().commit_errors.inc();
            error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
    all_committed
}
