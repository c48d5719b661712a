//! Retention policy for persisted objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a stored object stays valid, and how often stale ones are swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum age of a stored object, in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Sweep interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_window_ms() -> u64 {
    30_000
}

fn default_tick_ms() -> u64 {
    1_000
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl RetentionPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Objects last seen before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::milliseconds(self.window_ms as i64)
    }
}
