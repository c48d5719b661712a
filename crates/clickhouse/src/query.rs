//! Read-side helpers for tests and admin tooling.

use crate::client::ClickHouseClient;
use crate::schema::OBJECTS_TABLE;
use crate::store::ObjectRow;
use engine_core::{Error, Result};

/// Count stored objects, collapsing unmerged duplicates.
pub async fn count_objects(client: &ClickHouseClient) -> Result<u64> {
    let count: u64 = client
        .inner()
        .query(&format!(
            "SELECT count() FROM {} FINAL",
            client.table(OBJECTS_TABLE)
        ))
        .fetch_one()
        .await
        .map_err(|e| Error::storage(format!("Query error: {}", e)))?;
    Ok(count)
}

/// Fetch stored objects ordered by id.
pub async fn query_objects(client: &ClickHouseClient, limit: u32) -> Result<Vec<ObjectRow>> {
    let rows: Vec<ObjectRow> = client
        .inner()
        .query(&format!(
            "SELECT object_id, toUnixTimestamp64Milli(last_seen) AS last_seen FROM {} FINAL ORDER BY object_id LIMIT ?",
            client.table(OBJECTS_TABLE)
        ))
        .bind(limit)
        .fetch_all()
        .await
        .map_err(|e| Error::storage(format!("Query error: {}", e)))?;
    Ok(rows)
}

/// Remove every stored object (test cleanup).
pub async fn truncate_objects(client: &ClickHouseClient) -> Result<()> {
    client
        .inner()
        .query(&format!("TRUNCATE TABLE IF EXISTS {}", client.table(OBJECTS_TABLE)))
        .execute()
        .await
        .map_err(|e| Error::storage(format!("Truncate error: {}", e)))?;
    Ok(())
}
