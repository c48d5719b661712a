//! Redpanda health checks.

use crate::client::connect;
use crate::config::RedpandaConfig;
use std::collections::HashSet;
use telemetry::health;
use tracing::{debug, error, warn};

/// Connects, lists topics, and records the outcome in the health registry.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let client = match connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Redpanda health check failed");
            health().redpanda.set_unhealthy(e.to_string());
            return false;
        }
    };

    match client.list_topics().await {
        Ok(topics) => {
            debug!(topics = topics.len(), "Redpanda connection healthy");
            health().redpanda.set_healthy();
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to list Redpanda topics");
            health().redpanda.set_unhealthy(format!("list topics: {}", e));
            false
        }
    }
}

/// Returns the configured topics that do not exist on the cluster.
pub async fn missing_topics(config: &RedpandaConfig) -> Vec<String> {
    let mut wanted: Vec<&str> = config
        .consumer
        .topics
        .iter()
        .map(String::as_str)
        .collect();
    wanted.push(config.producer.topic.as_str());
    wanted.sort_unstable();
    wanted.dedup();

    let existing = match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => topics.into_iter().map(|t| t.name).collect::<HashSet<_>>(),
            Err(e) => {
                warn!(error = %e, "Could not list topics");
                HashSet::new()
            }
        },
        Err(_) => HashSet::new(),
    };

    wanted
        .into_iter()
        .filter(|t| !existing.contains(*t))
        .map(str::to_string)
        .collect()
}
