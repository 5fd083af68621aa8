//! Health check endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn ping() {}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Json<Value> {
    let workers: Vec<Value> = state
        .workers
        .snapshot()
        .into_iter()
        .map(|(shard, worker_state)| json!({ "shard": shard, "state": worker_state.as_str() }))
        .collect();

    Json(json!({
        "status": "ready",
        "shards": state.dispatcher.shards(),
        "queue": state.dispatcher.backend(),
        "store": state.store.backend(),
        "workers": workers,
    }))
}
