//! Common test setup functions.

use api::{router, AppState};
use axum_test::TestServer;
use engine_core::{ObjectId, ObjectRepository};
use redpanda::{ConsumerConfig, EventProducer, StreamConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use worker::{Callback, EnrichmentConfig, EnrichmentHandler};

use crate::fixtures::StatusServer;
use crate::mocks::{ChannelSource, MemoryStore, SourceHandle};

/// Router over `producer`, wrapped in an axum-test server.
pub fn api_server(producer: Arc<dyn EventProducer>) -> TestServer {
    let state = AppState::new(Callback::new(producer));
    TestServer::new(router(state)).expect("Failed to create test server")
}

pub fn consumer_config(batch_size: usize, flush_period_ms: u64) -> ConsumerConfig {
    ConsumerConfig {
        group_id: "presence-test".to_string(),
        topics: vec!["objects".to_string()],
        batch_size,
        flush_period_ms,
        ..Default::default()
    }
}

pub fn enrichment_config(endpoint: &str) -> EnrichmentConfig {
    EnrichmentConfig {
        endpoint: endpoint.to_string(),
        request_timeout_ms: 1000,
        retry_delay_ms: 20,
        persist_retry_delay_ms: 20,
        ..Default::default()
    }
}

/// Consumer → enrichment → memory store, with a stub status endpoint.
pub struct Pipeline {
    pub token: CancellationToken,
    pub source: SourceHandle,
    pub store: Arc<MemoryStore>,
    pub status: StatusServer,
    pub consumer: StreamConsumer,
}

impl Pipeline {
    /// Builds and starts the pipeline on a fresh token.
    pub async fn start(
        config: ConsumerConfig,
        offline: &[ObjectId],
        failing: &[ObjectId],
    ) -> Self {
        Self::start_with_token(config, offline, failing, CancellationToken::new()).await
    }

    pub async fn start_with_token(
        config: ConsumerConfig,
        offline: &[ObjectId],
        failing: &[ObjectId],
        token: CancellationToken,
    ) -> Self {
        let status = StatusServer::start(offline, failing).await;
        let store = MemoryStore::new();

        let repository: Arc<dyn ObjectRepository> = store.clone();
        let handler = EnrichmentHandler::new(enrichment_config(&status.endpoint), repository)
            .expect("Failed to create enrichment handler");

        let (source, handle) = ChannelSource::new("objects");
        let consumer = StreamConsumer::new(Box::new(source), config, token.clone());
        consumer.consume(Arc::new(handler));

        Self {
            token,
            source: handle,
            store,
            status,
            consumer,
        }
    }

    /// Polls until `check` holds or `timeout` passes.
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }
}
