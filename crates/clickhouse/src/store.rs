//! [`ObjectRepository`] backed by ClickHouse.

use crate::client::ClickHouseClient;
use crate::schema::OBJECTS_TABLE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use engine_core::{Error, Object, ObjectRepository, Result};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::debug;

/// One stored object. `last_seen` is milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ObjectRow {
    pub object_id: i64,
    pub last_seen: i64,
}

impl From<&Object> for ObjectRow {
    fn from(object: &Object) -> Self {
        Self {
            object_id: object.id,
            last_seen: object
                .last_seen
                .unwrap_or_else(Utc::now)
                .timestamp_millis(),
        }
    }
}

impl ObjectRow {
    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_seen)
    }
}

#[derive(Clone)]
pub struct ObjectStore {
    client: ClickHouseClient,
}

impl ObjectStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }
}

#[async_trait]
impl ObjectRepository for ObjectStore {
    async fn upsert(&self, objects: &[Object]) -> Result<u64> {
        if objects.is_empty() {
            return Ok(0);
        }

        let start = std::time::Instant::now();

        let mut insert = self
            .client
            .inner()
            .insert(OBJECTS_TABLE)
            .map_err(|e| Error::storage(format!("Insert error: {}", e)))?;

        for object in objects {
            insert
                .write(&ObjectRow::from(object))
                .await
                .map_err(|e| Error::storage(format!("Write error: {}", e)))?;
        }

        insert
            .end()
            .await
            .map_err(|e| Error::storage(format!("End error: {}", e)))?;

        let elapsed = start.elapsed();
        metrics().upsert_latency_ms.observe(elapsed.as_millis() as u64);

        debug!(
            count = objects.len(),
            latency_ms = %elapsed.as_millis(),
            "Upserted objects"
        );

        Ok(objects.len() as u64)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let table = self.client.table(OBJECTS_TABLE);
        let cutoff_ms = cutoff.timestamp_millis();

        let expired: u64 = self
            .client
            .inner()
            .query(&format!(
                "SELECT count() FROM {table} FINAL WHERE toUnixTimestamp64Milli(last_seen) < ?"
            ))
            .bind(cutoff_ms)
            .fetch_one()
            .await
            .map_err(|e| Error::storage(format!("Query error: {}", e)))?;

        if expired == 0 {
            return Ok(0);
        }

        self.client
            .inner()
            .query(&format!(
                "DELETE FROM {table} WHERE toUnixTimestamp64Milli(last_seen) < ?"
            ))
            .bind(cutoff_ms)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("Delete error: {}", e)))?;

        debug!(expired, cutoff = %cutoff, "Deleted expired objects");
        Ok(expired)
    }
}
