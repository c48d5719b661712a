//! In-memory stand-ins for the broker, the producer and the object store.
//!
//! Each mock keeps its state behind an `Arc` so a test can hand the mock to
//! production code (often boxed) and still inspect what happened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::{Error, Object, ObjectId, ObjectRepository, Result};
use parking_lot::Mutex;
use redpanda::{ConsumedMessage, EventProducer, MessageSource, RecordWriter};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// What a [`ChannelSource`] has been asked to do.
#[derive(Default)]
pub struct SourceLog {
    commits: Mutex<Vec<i64>>,
    closed: AtomicBool,
}

impl SourceLog {
    /// Offsets committed so far, in commit order.
    pub fn commits(&self) -> Vec<i64> {
        self.commits.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Test side of a [`ChannelSource`]: pushes payloads as broker messages.
#[derive(Clone)]
pub struct SourceHandle {
    topic: String,
    tx: mpsc::UnboundedSender<ConsumedMessage>,
    next_offset: Arc<Mutex<i64>>,
    pub log: Arc<SourceLog>,
}

impl SourceHandle {
    /// Publishes `payload` and returns its offset.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> i64 {
        let mut next = self.next_offset.lock();
        let offset = *next;
        *next += 1;

        let _ = self.tx.send(ConsumedMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            payload: payload.into(),
        });
        offset
    }
}

/// [`MessageSource`] fed from an unbounded channel.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<ConsumedMessage>,
    log: Arc<SourceLog>,
}

impl ChannelSource {
    pub fn new(topic: &str) -> (Self, SourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(SourceLog::default());

        let source = Self {
            rx,
            log: log.clone(),
        };
        let handle = SourceHandle {
            topic: topic.to_string(),
            tx,
            next_offset: Arc::new(Mutex::new(0)),
            log,
        };
        (source, handle)
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn read(&mut self, timeout: Duration) -> Result<Option<ConsumedMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                // Every sender is gone; behave like an idle broker.
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    async fn commit(&mut self, message: &ConsumedMessage) -> Result<()> {
        self.log.commits.lock().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// [`ObjectRepository`] over a map keyed by object id.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectId, Object>>,
    upserts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `n` upserts fail with a storage error.
    pub fn fail_next_upserts(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn insert(&self, object: Object) {
        self.objects.lock().insert(object.id, object);
    }

    pub fn get(&self, id: ObjectId) -> Option<Object> {
        self.objects.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.lock().keys().copied().collect()
    }

    /// Upsert calls that reached the store, failed ones included.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectRepository for MemoryStore {
    async fn upsert(&self, objects: &[Object]) -> Result<u64> {
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::storage("connection reset"));
        }

        let mut stored = self.objects.lock();
        for object in objects {
            stored.insert(object.id, object.clone());
        }
        Ok(objects.len() as u64)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut stored = self.objects.lock();
        let before = stored.len();
        stored.retain(|_, object| object.last_seen.map_or(true, |seen| seen >= cutoff));
        Ok((before - stored.len()) as u64)
    }
}

/// [`RecordWriter`] that keeps every written payload.
#[derive(Default)]
pub struct MemoryWriter {
    records: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordWriter for MemoryWriter {
    async fn write(&self, payloads: &[Vec<u8>]) -> Result<Vec<i64>> {
        let mut records = self.records.lock();
        let start = records.len() as i64;
        records.extend(payloads.iter().cloned());
        Ok((start..start + payloads.len() as i64).collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// [`EventProducer`] that captures payloads instead of enqueueing them.
#[derive(Clone, Default)]
pub struct MockProducer {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    should_fail: Arc<AtomicBool>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    /// Payloads decoded back into id lists.
    pub fn published_ids(&self) -> Vec<Vec<ObjectId>> {
        self.payloads
            .lock()
            .iter()
            .filter_map(|p| serde_json::from_slice(p).ok())
            .collect()
    }

    /// Simulates a stopped producer.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventProducer for MockProducer {
    async fn produce(&self, payload: Vec<u8>) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Canceled);
        }
        self.payloads.lock().push(payload);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.should_fail.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_memory_store_expires_by_last_seen() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut fresh = Object::new(1);
        fresh.mark_seen(now);
        let mut stale = Object::new(2);
        stale.mark_seen(now - ChronoDuration::seconds(60));
        store.upsert(&[fresh, stale]).await.unwrap();

        let removed = store
            .delete_expired(now - ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_memory_store_failure_budget() {
        let store = MemoryStore::new();
        store.fail_next_upserts(1);

        assert!(store.upsert(&[Object::new(5)]).await.is_err());
        assert!(store.upsert(&[Object::new(5)]).await.is_ok());
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_channel_source_times_out_when_idle() {
        let (mut source, handle) = ChannelSource::new("objects");
        assert_eq!(handle.send("[1]"), 0);

        let first = source.read(Duration::from_millis(50)).await.unwrap();
        assert_eq!(first.map(|m| m.offset), Some(0));

        let idle = source.read(Duration::from_millis(20)).await.unwrap();
        assert!(idle.is_none());
    }
}
