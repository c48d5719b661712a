//! ClickHouse health checks and schema bootstrap.

use crate::client::ClickHouseClient;
use crate::schema::all_statements;
use engine_core::{Error, Result};
use telemetry::health;
use tracing::{debug, error};

/// Runs `SELECT 1` and records the outcome in the health registry.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            health().clickhouse.set_healthy();
            true
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            health().clickhouse.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Creates the database and table if they do not exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    // The target database may not exist yet, so DDL runs against `default`.
    let admin = client.inner().clone().with_database("default");

    for ddl in all_statements(client.database()) {
        admin
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| Error::storage(format!("Failed to execute DDL: {}", e)))?;
    }

    debug!(database = %client.database(), "ClickHouse schema initialized");
    Ok(())
}
