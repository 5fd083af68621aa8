//! Rebuild endpoint.

use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::{Json, Router};
use gantry_core::{BuildRequest, StatusKey};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/build/{*key}", post(rebuild))
}

#[derive(Debug, Default, Deserialize)]
struct RebuildParams {
    #[serde(default)]
    reset: bool,
}

/// Re-queue the last push seen for `{branch}:{repository}`.
async fn rebuild(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<RebuildParams>,
) -> Result<Json<Value>, ApiError> {
    let key: StatusKey = key.parse()?;

    let payload = state
        .store
        .payload(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no push recorded for {}", key)))?;

    let mut request = BuildRequest::from_push_payload(&payload)?
        .ok_or_else(|| ApiError::BadRequest(format!("recorded push for {} has nothing to build", key)))?;
    request.reset = params.reset;

    let shard = state.dispatcher.dispatch(&request).await?;
    info!(key = %key, reset = request.reset, shard, "Rebuild requested");

    Ok(Json(json!({
        "status": "queued",
        "key": key.to_string(),
        "build_id": request.id,
        "shard": shard,
        "reset": request.reset,
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::state;
    use crate::routes::webhooks::tests::push_body;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gantry_core::queue::{QueueEntry, ShardQueue, queue_key};
    use gantry_scheduler::shard_for;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_rebuild_unknown_key_is_404() {
        let (state, _) = state();
        let app = crate::routes::router(state);

        let response = app
            .oneshot(
                Request::post("/build/main:acme/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rebuild_with_reset() {
        let (state, backend) = state();
        let app = crate::routes::router(state);
        let queue = queue_key(shard_for("acme/widgets", 2).unwrap());

        let response = app
            .clone()
            .oneshot(Request::post("/").body(Body::from(push_body())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        backend.queue.pop(&queue).await.unwrap();

        let response = app
            .oneshot(
                Request::post("/build/main:acme/widgets?reset=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = backend.queue.pop(&queue).await.unwrap();
        let QueueEntry::Request(request) = QueueEntry::decode(&raw).unwrap() else {
            panic!("expected a build request");
        };
        assert!(request.reset);
        assert_eq!(request.branch, "main");
    }

    #[tokio::test]
    async fn test_malformed_key_is_400() {
        let (state, _) = state();
        let app = crate::routes::router(state);

        let response = app
            .oneshot(Request::post("/build/nokey").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
