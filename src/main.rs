//! Presence Engine
//!
//! Object presence pipeline:
//! - Redpanda batches of object ids, flushed by size or period
//! - Status enrichment with retry until cancellation
//! - Online objects upserted into ClickHouse, stale ones swept
//! - HTTP trigger that republishes id lists to the broker

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use api::{router, AppState};
use clickhouse_client::{ClickHouseClient, ObjectStore};
use engine_core::ObjectRepository;
use redpanda::{KafkaSource, KafkaWriter, Producer, StreamConsumer};
use telemetry::init_tracing_from_env;
use worker::{Callback, EnrichmentHandler, RetentionSweeper, ShutdownCoordinator};

const API_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting Presence Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load()?;
    info!(
        brokers = ?config.redpanda.brokers,
        topics = ?config.redpanda.consumer.topics,
        group_id = %config.redpanda.consumer.group_id,
        endpoint = %config.enrichment.endpoint,
        "Loaded configuration"
    );

    // Storage
    let clickhouse = ClickHouseClient::new(config.clickhouse.clone());
    if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
        // Continue anyway - schema might already exist
        error!(error = %e, "Failed to initialize ClickHouse schema");
    }
    check_health(&config, &clickhouse).await;

    let store: Arc<dyn ObjectRepository> = Arc::new(ObjectStore::new(clickhouse));
    let coordinator = ShutdownCoordinator::new();

    // Consumer and enrichment
    let source = KafkaSource::connect(&config.redpanda)
        .await
        .context("Failed to create Redpanda consumer")?;
    let consumer = Arc::new(StreamConsumer::new(
        Box::new(source),
        config.redpanda.consumer.clone(),
        coordinator.token(),
    ));
    let handler = Arc::new(
        EnrichmentHandler::new(config.enrichment.clone(), store.clone())
            .context("Failed to create enrichment handler")?,
    );

    // Producer for the trigger endpoint
    let producer_client = redpanda::client::connect(&config.redpanda)
        .await
        .context("Failed to connect Redpanda producer")?;
    let writer = KafkaWriter::new(&producer_client, &config.redpanda.producer)
        .await
        .context("Failed to create Redpanda producer")?;
    let producer = Arc::new(Producer::start(
        config.redpanda.producer.clone(),
        Arc::new(writer),
    ));
    let callback = Callback::new(producer.clone());

    // Retention
    let sweeper = Arc::new(RetentionSweeper::new(
        store.clone(),
        config.retention,
        coordinator.token(),
    ));

    // HTTP server
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on http://{}", addr);

    let app = router(AppState::new(callback));
    let server_token = coordinator.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
    });

    consumer.consume(handler);
    sweeper.start();

    let coordinator = coordinator
        .with_stage("api", move || async move {
            match tokio::time::timeout(API_SHUTDOWN_TIMEOUT, server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!(error = %e, "Server error"),
                Ok(Err(e)) => error!(error = %e, "Server task failed"),
                Err(_) => warn!("Server did not drain within timeout"),
            }
        })
        .with_stage("sweeper", {
            let sweeper = sweeper.clone();
            move || async move { sweeper.stop().await }
        })
        .with_stage("consumer", {
            let consumer = consumer.clone();
            move || async move { consumer.stop().await }
        })
        .with_stage("producer", {
            let producer = producer.clone();
            move || async move { producer.stop().await }
        })
        .with_stage("storage", move || async move {
            drop(store);
            info!("Released storage handle");
        });

    coordinator.wait_for_signal().await;
    info!("Shutting down...");
    coordinator.shutdown().await;

    Ok(())
}

/// Check component health on startup.
async fn check_health(config: &config::Config, clickhouse: &ClickHouseClient) {
    if redpanda::health::check_connection(&config.redpanda).await {
        info!("Redpanda connection: healthy");
        let missing = redpanda::health::missing_topics(&config.redpanda).await;
        if !missing.is_empty() {
            warn!(topics = ?missing, "Configured topics do not exist");
        }
    } else {
        error!("Redpanda connection: unhealthy");
    }

    if clickhouse_client::health::check_connection(clickhouse).await {
        info!("ClickHouse connection: healthy");
    } else {
        error!("ClickHouse connection: unhealthy");
    }
}
