//! Callback rendezvous endpoints.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use tracing::debug;

use crate::AppState;
use crate::callback::WaitError;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/callback/{id}", get(wait).post(deliver))
}

/// Block until something is posted to the same id, or time out.
async fn wait(State(state): State<AppState>, Path(id): Path<String>) -> Result<Bytes, ApiError> {
    debug!(callback = %id, "Waiting on callback");
    state.callbacks.wait(&id).await.map_err(|e| match e {
        WaitError::AlreadyWaiting(_) => ApiError::Conflict(e.to_string()),
        WaitError::TimedOut(_) => ApiError::NotFound(e.to_string()),
    })
}

async fn deliver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if state.callbacks.deliver(&id, body) {
        debug!(callback = %id, "Callback delivered");
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound(format!("nobody is waiting on callback {}", id)))
    }
}
