//! Process configuration.

use anyhow::{Context, Result};
use clickhouse_client::ClickHouseConfig;
use engine_core::RetentionPolicy;
use redpanda::{OffsetReset, RedpandaConfig};
use serde::{Deserialize, Serialize};
use validator::Validate;
use worker::EnrichmentConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Address the trigger endpoint binds to
    #[serde(default = "default_api_listener")]
    #[validate(length(min = 1))]
    pub api_listener: String,

    #[serde(default)]
    #[validate(nested)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    #[validate(nested)]
    pub redpanda: RedpandaConfig,

    #[serde(default)]
    #[validate(nested)]
    pub clickhouse: ClickHouseConfig,

    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_api_listener() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_listener: default_api_listener(),
            enrichment: EnrichmentConfig::default(),
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl Config {
    /// Bind address; a bare `:port` listens on all interfaces.
    pub fn listen_addr(&self) -> String {
        match self.api_listener.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.api_listener.clone(),
        }
    }

    /// Applies the flat deployment variables on top of the layered config.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(listener) = var("API_LISTENER") {
            self.api_listener = listener;
        }
        if let Some(endpoint) = var("OBJECT_ENDPOINT") {
            self.enrichment.endpoint = endpoint;
        }

        if let Some(brokers) = var("KAFKA_HOST") {
            self.redpanda.brokers = brokers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(group) = var("KAFKA_GROUP_ID") {
            self.redpanda.consumer.group_id = group;
        }
        if let Some(topic) = var("KAFKA_TOPIC") {
            self.redpanda.consumer.topics = vec![topic.clone()];
            self.redpanda.producer.topic = topic;
        }
        if let Some(reset) = var("KAFKA_OFFSET_RESET") {
            self.redpanda.consumer.offset_reset = reset
                .parse::<OffsetReset>()
                .context("Invalid KAFKA_OFFSET_RESET")?;
        }
        if let Some(username) = var("KAFKA_SASL_USERNAME") {
            self.redpanda.sasl_username = Some(username);
        }
        if let Some(password) = var("KAFKA_SASL_PASSWORD") {
            self.redpanda.sasl_password = Some(password);
        }

        if let Some(url) = var("CLICKHOUSE_URL") {
            self.clickhouse.url = url;
        }
        if let Some(database) = var("CLICKHOUSE_DATABASE") {
            self.clickhouse.database = database;
        }
        if let Some(username) = var("CLICKHOUSE_USERNAME") {
            self.clickhouse.username = Some(username);
        }
        if let Some(password) = var("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = Some(password);
        }

        Ok(())
    }
}

/// Loads configuration from defaults, `config/default.toml`, `PRESENCE__*`
/// variables and the flat deployment variables, then validates it.
pub fn load() -> Result<Config> {
    let layered = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::with_prefix("PRESENCE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = layered
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate cannot map these flat names onto nested fields
    config.apply_overrides(|name| std::env::var(name).ok())?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
