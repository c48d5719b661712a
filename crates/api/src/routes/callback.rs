//! Inbound trigger endpoint.

use axum::{body::Bytes, extract::State};
use engine_core::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub object_ids: Vec<ObjectId>,
}

/// POST /callback - republish a list of object ids.
///
/// Answers as soon as the ids are handed to the producer; delivery is not
/// awaited.
pub async fn callback_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let request: CallbackRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejected callback body");
        ApiError::bad_request(e.to_string())
    })?;

    debug!(ids = request.object_ids.len(), "Received callback");
    state.callback.callback(&request.object_ids)?;

    Ok("ok")
}
