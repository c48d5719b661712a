//! ClickHouse DDL for the object store.
//!
//! `ReplacingMergeTree(last_seen)` keyed by `object_id` keeps the newest row
//! per object after merges. Reads use `FINAL` so unmerged duplicates never
//! show up.

pub const OBJECTS_TABLE: &str = "objects";

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}

pub fn create_objects_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.{OBJECTS_TABLE} (
    object_id Int64,
    last_seen DateTime64(3, 'UTC')
)
ENGINE = ReplacingMergeTree(last_seen)
ORDER BY object_id
SETTINGS index_granularity = 8192
"#
    )
}

/// Every statement needed at startup, in execution order.
pub fn all_statements(database: &str) -> Vec<String> {
    vec![create_database(database), create_objects_table(database)]
}
