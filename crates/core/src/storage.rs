//! Persistence port for tracked objects.
//!
//! The enrichment handler writes through it and the retention sweeper
//! deletes through it. Each call is expected to be atomic: the whole set is
//! applied or an error comes back. Nothing is assumed across calls.

use crate::{Object, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Inserts each object, replacing any stored row with the same id.
    ///
    /// Returns the number of rows written.
    async fn upsert(&self, objects: &[Object]) -> Result<u64>;

    /// Deletes every object last seen before `cutoff`.
    ///
    /// Returns the number of objects removed.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
