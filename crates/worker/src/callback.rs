//! Inbound trigger: republish identifier lists to the broker.

use engine_core::{ObjectId, Result};
use redpanda::EventProducer;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Callback {
    producer: Arc<dyn EventProducer>,
}

impl Callback {
    pub fn new(producer: Arc<dyn EventProducer>) -> Self {
        Self { producer }
    }

    /// Serializes `ids` and hands them to the producer without waiting for
    /// the enqueue. Only a serialization failure is reported.
    pub fn callback(&self, ids: &[ObjectId]) -> Result<()> {
        let payload = serde_json::to_vec(ids)?;
        debug!(ids = ids.len(), "Publishing callback ids");

        let producer = self.producer.clone();
        tokio::spawn(async move {
            if let Err(e) = producer.produce(payload).await {
                warn!(error = %e, "Callback payload was not published");
            }
        });

        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.producer.is_healthy()
    }
}
