//! Tracked objects and the batch-level transforms applied to them.
//!
//! Broker payloads carry JSON arrays of identifiers (`[12,98,1]`). A batch is
//! decoded, flattened, deduplicated, enriched, and finally filtered down to
//! the objects that reported themselves online.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Identifier of a tracked object.
pub type ObjectId = i64;

/// An object whose presence is being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub id: ObjectId,
    pub online: bool,
    /// Set when enrichment finishes, whether or not it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Object {
    /// A fresh, not-yet-enriched object.
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            online: false,
            last_seen: None,
        }
    }

    /// Copies the fields reported by the status endpoint.
    pub fn apply(&mut self, status: ObjectStatus) {
        if let Some(id) = status.id {
            if id != self.id {
                warn!(
                    requested = self.id,
                    reported = id,
                    "Status endpoint reported a different object id"
                );
            }
            self.id = id;
        }
        self.online = status.online;
    }

    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        self.last_seen = Some(at);
    }
}

/// Body returned by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStatus {
    #[serde(default)]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub online: bool,
}

/// Identifiers decoded from one batch of payloads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedIds {
    /// Every decoded identifier, in payload order, duplicates included
    pub ids: Vec<ObjectId>,
    /// Payloads that were not a JSON array of integers
    pub malformed: usize,
}

/// Decodes every payload as a JSON array of identifiers and flattens them.
///
/// A payload that does not decode is logged and skipped.
pub fn decode_ids<S: AsRef<str>>(payloads: &[S]) -> DecodedIds {
    let mut decoded = DecodedIds {
        ids: Vec::with_capacity(payloads.len() * 8),
        malformed: 0,
    };

    for payload in payloads {
        match serde_json::from_str::<Vec<ObjectId>>(payload.as_ref()) {
            Ok(ids) => decoded.ids.extend(ids),
            Err(e) => {
                decoded.malformed += 1;
                warn!(payload = payload.as_ref(), error = %e, "Skipping malformed payload");
            }
        }
    }

    decoded
}

/// Removes duplicates, keeping the first occurrence of each identifier.
pub fn dedupe(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Keeps only online objects, in their original relative order.
pub fn filter_online(objects: Vec<Object>) -> Vec<Object> {
    objects.into_iter().filter(|o| o.online).collect()
}
