//! Redpanda consumer and producer for the presence pipeline.

pub mod batch;
pub mod client;
pub mod config;
pub mod consumer;
pub mod health;
pub mod producer;
pub mod source;

pub use config::*;
pub use consumer::*;
pub use producer::*;
pub use source::KafkaSource;
