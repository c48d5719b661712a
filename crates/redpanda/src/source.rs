//! rskafka-backed [`MessageSource`].
//!
//! rskafka has no consumer-group coordinator, so every partition of every
//! subscribed topic is read directly and committed offsets are tracked in
//! memory. A restart resumes from the configured offset reset policy, so an
//! uncommitted batch is only redelivered within the same process lifetime.

use crate::client::connect;
use crate::config::{OffsetReset, RedpandaConfig};
use crate::consumer::{ConsumedMessage, MessageSource};
use async_trait::async_trait;
use engine_core::{Error, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info};

struct PartitionReader {
    topic: String,
    partition: i32,
    client: PartitionClient,
    next_offset: i64,
}

pub struct KafkaSource {
    group_id: String,
    max_fetch_bytes: i32,
    readers: Vec<PartitionReader>,
    buffered: VecDeque<ConsumedMessage>,
    committed: BTreeMap<(String, i32), i64>,
}

impl KafkaSource {
    /// Connects and positions a reader on every partition of the configured
    /// topics.
    pub async fn connect(config: &RedpandaConfig) -> Result<Self> {
        let client = connect(config).await?;
        let consumer = &config.consumer;

        let topics = client
            .list_topics()
            .await
            .map_err(|e| Error::broker(format!("Failed to list topics: {}", e)))?;

        let at = match consumer.offset_reset {
            OffsetReset::Earliest => OffsetAt::Earliest,
            OffsetReset::Latest => OffsetAt::Latest,
        };

        let mut readers = Vec::new();
        for name in &consumer.topics {
            let topic = topics
                .iter()
                .find(|t| &t.name == name)
                .ok_or_else(|| Error::broker(format!("Topic not found: {}", name)))?;

            for &partition in &topic.partitions {
                let partition_client = client
                    .partition_client(name.clone(), partition, UnknownTopicHandling::Retry)
                    .await
                    .map_err(|e| {
                        Error::broker(format!("Failed to get partition client: {}", e))
                    })?;

                let next_offset = partition_client
                    .get_offset(at)
                    .await
                    .map_err(|e| Error::broker(format!("Failed to get offset: {}", e)))?;

                info!(
                    topic = %name,
                    partition,
                    offset = next_offset,
                    "Partition reader positioned"
                );

                readers.push(PartitionReader {
                    topic: name.clone(),
                    partition,
                    client: partition_client,
                    next_offset,
                });
            }
        }

        if readers.is_empty() {
            return Err(Error::broker("No partitions to consume"));
        }

        info!(
            group_id = %consumer.group_id,
            partitions = readers.len(),
            "Kafka source ready"
        );

        Ok(Self {
            group_id: consumer.group_id.clone(),
            max_fetch_bytes: consumer.max_fetch_bytes,
            readers,
            buffered: VecDeque::new(),
            committed: BTreeMap::new(),
        })
    }

    /// Next offset to read per partition, as last committed.
    pub fn committed(&self) -> &BTreeMap<(String, i32), i64> {
        &self.committed
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn read(&mut self, timeout: Duration) -> Result<Option<ConsumedMessage>> {
        if let Some(message) = self.buffered.pop_front() {
            return Ok(Some(message));
        }

        let max_wait_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let bytes = fetch_bytes(self.max_fetch_bytes);
        let fetches = self.readers.iter().map(|r| {
            r.client
                .fetch_records(r.next_offset, bytes.clone(), max_wait_ms)
        });
        let results = futures::future::join_all(fetches).await;

        let mut failure = None;
        for (reader, result) in self.readers.iter_mut().zip(results) {
            match result {
                Ok((records, high_watermark)) => {
                    debug!(
                        topic = %reader.topic,
                        partition = reader.partition,
                        records = records.len(),
                        high_watermark,
                        "Fetched records"
                    );
                    for record in records {
                        reader.next_offset = record.offset + 1;
                        if let Some(payload) = record.record.value {
                            self.buffered.push_back(ConsumedMessage {
                                topic: reader.topic.clone(),
                                partition: reader.partition,
                                offset: record.offset,
                                payload,
                            });
                        }
                    }
                }
                Err(e) => {
                    failure.get_or_insert_with(|| {
                        Error::broker(format!(
                            "Failed to fetch {}/{}: {}",
                            reader.topic, reader.partition, e
                        ))
                    });
                }
            }
        }

        match (self.buffered.pop_front(), failure) {
            (Some(message), _) => Ok(Some(message)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }

    async fn commit(&mut self, message: &ConsumedMessage) -> Result<()> {
        let key = (message.topic.clone(), message.partition);
        let next = message.offset + 1;
        let entry = self.committed.entry(key).or_insert(next);
        *entry = (*entry).max(next);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        info!(
            group_id = %self.group_id,
            committed = ?self.committed,
            "Closing Kafka source"
        );
        self.buffered.clear();
        self.readers.clear();
        Ok(())
    }
}

/// Byte window for one fetch; `max` is inclusive.
fn fetch_bytes(max: i32) -> Range<i32> {
    1..max.saturating_add(1).max(2)
}
