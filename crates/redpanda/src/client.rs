//! rskafka client bootstrap.

use crate::config::RedpandaConfig;
use engine_core::{Error, Result};
use rskafka::client::{
    partition::Compression, Client, ClientBuilder, Credentials, SaslConfig,
};
use std::sync::Arc;
use tracing::info;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the cluster. TLS and SCRAM are enabled together when
/// credentials are configured.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if let Some((username, password)) = config.credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    let client = builder
        .build()
        .await
        .map_err(|e| Error::broker(format!("Failed to connect to Redpanda: {}", e)))?;

    info!(brokers = %config.broker_string(), "Connected to Redpanda");
    Ok(client)
}

/// Maps a configured compression name to the wire codec.
pub fn compression(name: &str) -> Compression {
    match name {
        "gzip" => Compression::Gzip,
        "snappy" => Compression::Snappy,
        "lz4" => Compression::Lz4,
        "zstd" => Compression::Zstd,
        _ => Compression::NoCompression,
    }
}
