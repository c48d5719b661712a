//! Application state shared across handlers.

use worker::Callback;

#[derive(Clone)]
pub struct AppState {
    /// Republishes identifier lists to the broker
    pub callback: Callback,
}

impl AppState {
    pub fn new(callback: Callback) -> Self {
        Self { callback }
    }
}
