//! Backpressure-aware producer.
//!
//! `produce` only enqueues. A send loop drains the queue into a
//! [`RecordWriter`] and a second task logs delivery reports. When the queue
//! is full the caller waits and tries again until it succeeds or the
//! producer is stopped.

use crate::client::compression;
use crate::config::ProducerConfig;
use async_trait::async_trait;
use chrono::Utc;
use engine_core::{retry, Error, Result};
use parking_lot::Mutex;
use rskafka::client::partition::{PartitionClient, UnknownTopicHandling};
use rskafka::client::Client;
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Publishing seam used by the trigger path.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Enqueues `payload`, waiting out backpressure. Fails only when the
    /// producer was stopped first, in which case the payload is lost.
    async fn produce(&self, payload: Vec<u8>) -> Result<()>;

    fn is_healthy(&self) -> bool;
}

/// Wire-level produce primitive.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Writes the payloads in order and returns their offsets.
    async fn write(&self, payloads: &[Vec<u8>]) -> Result<Vec<i64>>;

    async fn close(&self) -> Result<()>;
}

/// Outcome of one record, logged by the delivery-report task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered { offset: i64, bytes: usize },
    Failed { bytes: usize, error: String },
}

pub struct Producer {
    config: ProducerConfig,
    queue: mpsc::Sender<Vec<u8>>,
    stop: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Producer {
    /// Spawns the send loop and the delivery-report drain.
    pub fn start(config: ProducerConfig, writer: Arc<dyn RecordWriter>) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let send_loop = tokio::spawn(send_loop(
            rx,
            writer,
            reports_tx,
            config.clone(),
            stop.clone(),
        ));
        let drain = tokio::spawn(drain_reports(reports_rx));

        info!(
            topic = %config.topic,
            queue_capacity = config.queue_capacity,
            "Producer started"
        );

        Self {
            config,
            queue,
            stop,
            tasks: Mutex::new(vec![send_loop, drain]),
        }
    }

    /// Stops accepting payloads, delivers what is already queued, and waits
    /// for both background tasks to exit.
    pub async fn stop(&self) {
        self.stop.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Producer task failed");
            }
        }

        info!(topic = %self.config.topic, "Producer stopped");
    }
}

#[async_trait]
impl EventProducer for Producer {
    async fn produce(&self, payload: Vec<u8>) -> Result<()> {
        let mut payload = payload;

        loop {
            if self.stop.is_cancelled() {
                metrics().messages_dropped.inc();
                error!(bytes = payload.len(), "Failed to produce message: producer stopped");
                return Err(Error::Canceled);
            }

            match self.queue.try_send(payload) {
                Ok(()) => {
                    metrics().messages_enqueued.inc();
                    return Ok(());
                }
                Err(TrySendError::Full(p)) => {
                    payload = p;
                    metrics().producer_queue_full.inc();
                    warn!("Producer queue full, retrying");
                    retry::sleep(&self.stop, self.config.queue_full_backoff()).await;
                }
                Err(TrySendError::Closed(p)) => {
                    payload = p;
                    error!("Failed to enqueue message: queue closed");
                    retry::sleep(&self.stop, self.config.error_backoff()).await;
                }
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.stop.is_cancelled()
    }
}

async fn send_loop(
    mut rx: mpsc::Receiver<Vec<u8>>,
    writer: Arc<dyn RecordWriter>,
    reports: mpsc::UnboundedSender<DeliveryReport>,
    config: ProducerConfig,
    stop: CancellationToken,
) {
    let max = config.max_batch_records.max(1);

    loop {
        let first = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = rx.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        let mut batch = vec![first];
        while batch.len() < max {
            match rx.try_recv() {
                Ok(payload) => batch.push(payload),
                Err(_) => break,
            }
        }

        deliver(writer.as_ref(), &batch, &reports, &config).await;
    }

    rx.close();
    let mut pending = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        pending.push(payload);
    }

    if !pending.is_empty() {
        info!(pending = pending.len(), "Flushing queued messages");
        let lost = flush_pending(writer.as_ref(), &pending, &reports, &config).await;
        if lost > 0 {
            metrics().messages_dropped.inc_by(lost as u64);
            error!(
                lost,
                timeout_ms = config.flush_timeout_ms,
                "Flush timed out, queued messages lost"
            );
        }
    }

    if let Err(e) = writer.close().await {
        error!(error = %e, "Failed to close record writer");
    }
    debug!("Send loop exited");
}

/// Delivers `pending` in chunks within the flush timeout. Returns how many
/// payloads were never handed to the writer.
async fn flush_pending(
    writer: &dyn RecordWriter,
    pending: &[Vec<u8>],
    reports: &mpsc::UnboundedSender<DeliveryReport>,
    config: &ProducerConfig,
) -> usize {
    let max = config.max_batch_records.max(1);
    let mut done = 0;

    let flushed = tokio::time::timeout(config.flush_timeout(), async {
        for chunk in pending.chunks(max) {
            deliver(writer, chunk, reports, config).await;
            done += chunk.len();
        }
    })
    .await;

    match flushed {
        Ok(()) => 0,
        Err(_) => pending.len() - done,
    }
}

async fn deliver(
    writer: &dyn RecordWriter,
    batch: &[Vec<u8>],
    reports: &mpsc::UnboundedSender<DeliveryReport>,
    config: &ProducerConfig,
) {
    let mut attempt = 0;

    loop {
        let start = std::time::Instant::now();
        match writer.write(batch).await {
            Ok(offsets) => {
                metrics()
                    .produce_latency_ms
                    .observe(start.elapsed().as_millis() as u64);
                for (payload, offset) in batch.iter().zip(offsets) {
                    let _ = reports.send(DeliveryReport::Delivered {
                        offset,
                        bytes: payload.len(),
                    });
                }
                return;
            }
            Err(e) if attempt < config.retries => {
                attempt += 1;
                warn!(attempt, error = %e, "Produce failed, retrying");
                tokio::time::sleep(config.retry_backoff()).await;
            }
            Err(e) => {
                for payload in batch {
                    let _ = reports.send(DeliveryReport::Failed {
                        bytes: payload.len(),
                        error: e.to_string(),
                    });
                }
                return;
            }
        }
    }
}

async fn drain_reports(mut reports: mpsc::UnboundedReceiver<DeliveryReport>) {
    while let Some(report) = reports.recv().await {
        match report {
            DeliveryReport::Delivered { offset, bytes } => {
                metrics().messages_delivered.inc();
                debug!(offset, bytes, "Message delivered");
            }
            DeliveryReport::Failed { bytes, error } => {
                metrics().delivery_failures.inc();
                error!(bytes, error = %error, "Message delivery failed");
            }
        }
    }
    debug!("Delivery report drain exited");
}

/// [`RecordWriter`] over a single rskafka partition.
pub struct KafkaWriter {
    topic: String,
    client: PartitionClient,
    compression: String,
}

impl KafkaWriter {
    /// Opens a partition client for the producer topic (partition 0).
    pub async fn new(client: &Client, config: &ProducerConfig) -> Result<Self> {
        let partition_client = client
            .partition_client(config.topic.clone(), 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| Error::broker(format!("Failed to get partition client: {}", e)))?;

        Ok(Self {
            topic: config.topic.clone(),
            client: partition_client,
            compression: config.compression.clone(),
        })
    }
}

#[async_trait]
impl RecordWriter for KafkaWriter {
    async fn write(&self, payloads: &[Vec<u8>]) -> Result<Vec<i64>> {
        let records = payloads
            .iter()
            .map(|payload| Record {
                key: None,
                value: Some(payload.clone()),
                headers: BTreeMap::new(),
                timestamp: Utc::now(),
            })
            .collect();

        self.client
            .produce(records, compression(&self.compression))
            .await
            .map_err(|e| Error::broker(format!("Failed to produce: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!(topic = %self.topic, "Closing Kafka writer");
        Ok(())
    }
}
