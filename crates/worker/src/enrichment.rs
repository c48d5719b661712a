//! Batch enrichment: decode, fan out status lookups, filter, persist.
//!
//! Every distinct identifier in a batch gets its own task. A lookup is
//! retried until it succeeds or the shared token fires, so one stuck object
//! holds up persistence of the whole batch. Cancellation is only observed
//! between attempts; an in-flight request runs to its own timeout.

use async_trait::async_trait;
use chrono::Utc;
use engine_core::{
    decode_ids, dedupe, filter_online, retry, Error, Object, ObjectId, ObjectRepository,
    ObjectStatus, Result,
};
use redpanda::BatchHandler;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use validator::Validate;

/// Status endpoint and retry timing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnrichmentConfig {
    /// Base URL; the object id is appended verbatim
    #[validate(url)]
    pub endpoint: String,
    /// Timeout for a single status request in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    /// Delay between lookup attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay between persistence attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub persist_retry_delay_ms: u64,
    /// Idle connections kept per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_pool_max_idle_per_host() -> usize {
    1000
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/objects/".to_string(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            persist_retry_delay_ms: default_retry_delay_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl EnrichmentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn persist_retry_delay(&self) -> Duration {
        Duration::from_millis(self.persist_retry_delay_ms)
    }
}

/// HTTP client for the status endpoint.
#[derive(Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    endpoint: String,
}

impl StatusClient {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    /// One lookup attempt. On success the reported status is copied into
    /// `object`; on failure `object` is left untouched.
    pub async fn fetch(&self, object: &mut Object) -> Result<()> {
        let url = format!("{}{}", self.endpoint, object.id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::request(e.to_string()))?;
        let reported: ObjectStatus = serde_json::from_slice(&body)
            .map_err(|e| Error::decode(status.as_u16(), e.to_string()))?;

        object.apply(reported);
        Ok(())
    }
}

pub struct EnrichmentHandler {
    client: StatusClient,
    store: Arc<dyn ObjectRepository>,
    config: EnrichmentConfig,
}

impl EnrichmentHandler {
    pub fn new(config: EnrichmentConfig, store: Arc<dyn ObjectRepository>) -> Result<Self> {
        Ok(Self {
            client: StatusClient::new(&config)?,
            store,
            config,
        })
    }

    /// Enriches and persists one batch of raw payloads.
    ///
    /// Returns [`Error::Canceled`] when the token fired before the batch was
    /// persisted. Lookup and storage failures are retried, never returned.
    pub async fn handle(&self, token: &CancellationToken, payloads: Vec<String>) -> Result<()> {
        let decoded = decode_ids(&payloads);
        metrics().malformed_payloads.inc_by(decoded.malformed as u64);

        let ids = dedupe(&decoded.ids);
        if ids.is_empty() {
            debug!(payloads = payloads.len(), "Batch carried no identifiers");
            return Ok(());
        }

        let count = ids.len();
        let mut tasks = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            let client = self.client.clone();
            let token = token.clone();
            let delay = self.config.retry_delay();
            tasks.spawn(async move { (index, enrich(&client, &token, id, delay).await) });
        }

        let mut enriched: Vec<Option<Object>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, object)) => enriched[index] = Some(object),
                Err(e) => error!(error = %e, "Enrichment task failed"),
            }
        }

        if token.is_cancelled() {
            info!(objects = count, "Batch canceled before persistence");
            return Err(Error::Canceled);
        }

        let online = filter_online(enriched.into_iter().flatten().collect());
        if online.is_empty() {
            debug!(objects = count, "No online objects in batch");
            return Ok(());
        }

        self.persist(token, &online).await
    }

    async fn persist(&self, token: &CancellationToken, objects: &[Object]) -> Result<()> {
        loop {
            match self.store.upsert(objects).await {
                Ok(written) => {
                    metrics().objects_persisted.inc_by(written);
                    info!(objects = written, "Persisted online objects");
                    return Ok(());
                }
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) => {
                    metrics().upsert_errors.inc();
                    error!(objects = objects.len(), error = %e, "Failed to persist objects");
                    if !retry::sleep(token, self.config.persist_retry_delay()).await {
                        return Err(Error::Canceled);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BatchHandler for EnrichmentHandler {
    async fn handle(&self, token: &CancellationToken, payloads: Vec<String>) -> Result<()> {
        EnrichmentHandler::handle(self, token, payloads).await
    }
}

/// Looks up `id` until it succeeds or `token` fires, then stamps `last_seen`.
async fn enrich(
    client: &StatusClient,
    token: &CancellationToken,
    id: ObjectId,
    delay: Duration,
) -> Object {
    let mut object = Object::new(id);
    metrics().in_flight_enrichments.inc();

    loop {
        metrics().enrichment_requests.inc();
        let start = Instant::now();

        match client.fetch(&mut object).await {
            Ok(()) => {
                metrics()
                    .enrichment_latency_ms
                    .observe(start.elapsed().as_millis() as u64);
                break;
            }
            Err(e) => {
                metrics().enrichment_failures.inc();
                error!(object_id = id, error = %e, "Failed to fetch object status");
                if !retry::sleep(token, delay).await {
                    debug!(object_id = id, "Enrichment canceled");
                    break;
                }
            }
        }
    }

    metrics().in_flight_enrichments.dec();
    object.mark_seen(Utc::now());
    object
}
