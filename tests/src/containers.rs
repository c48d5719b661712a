//! ClickHouse container for the storage tests.
//!
//! The broker is always mocked; only the object store runs for real. Set
//! `PRESENCE_TEST_CLICKHOUSE_URL` to reuse an existing server instead of
//! starting a container.

use clickhouse_client::{ClickHouseClient, ClickHouseConfig};
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const IMAGE: &str = "clickhouse/clickhouse-server";
const TAG: &str = "24.3";
const HTTP_PORT: u16 = 8123;

pub struct ClickHouseContainer {
    #[allow(dead_code)]
    container: Option<ContainerAsync<GenericImage>>,
    pub config: ClickHouseConfig,
}

impl ClickHouseContainer {
    /// Starts a server (or reuses the configured one) with a database
    /// unique to `database`.
    pub async fn start(database: &str) -> Self {
        if let Some(url) = std::env::var("PRESENCE_TEST_CLICKHOUSE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            return Self {
                container: None,
                config: ClickHouseConfig {
                    url,
                    database: database.to_string(),
                    username: std::env::var("PRESENCE_TEST_CLICKHOUSE_USER").ok(),
                    password: std::env::var("PRESENCE_TEST_CLICKHOUSE_PASSWORD").ok(),
                },
            };
        }

        // CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT=1 lets `default` run DDL
        let image = GenericImage::new(IMAGE, TAG)
            .with_wait_for(WaitFor::seconds(5))
            .with_exposed_port(HTTP_PORT.tcp())
            .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
            .with_env_var("CLICKHOUSE_USER", "default")
            .with_env_var("CLICKHOUSE_PASSWORD", "");

        let container = image.start().await.expect("Failed to start ClickHouse");
        let port = container
            .get_host_port_ipv4(HTTP_PORT)
            .await
            .expect("ClickHouse port");
        let url = format!("http://127.0.0.1:{}", port);

        wait_for_http(&url, Duration::from_secs(30)).await;

        Self {
            container: Some(container),
            config: ClickHouseConfig {
                url,
                database: database.to_string(),
                username: Some("default".to_string()),
                password: None,
            },
        }
    }

    pub fn client(&self) -> ClickHouseClient {
        ClickHouseClient::new(self.config.clone())
    }
}

/// Polls the HTTP interface until it answers.
async fn wait_for_http(url: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("ClickHouse at {} not ready after {:?}", url, timeout);
}
