//! Build status endpoint.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use gantry_core::StatusKey;

use super::wants_json;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/status/{*key}", get(status))
}

/// Latest result for `{branch}:{repository}`.
///
/// Plain text log with 200 (passed) or 412 (failed), or the JSON result
/// when the client's `Accept` header takes `application/json`.
async fn status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Ok(key) = key.parse::<StatusKey>() else {
        return Err(ApiError::NotFound(format!("no build recorded for {}", key)));
    };
    let result = state
        .store
        .result(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no build recorded for {}", key)))?;

    if wants_json(&headers) {
        return Ok(Json(result).into_response());
    }

    let code = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::PRECONDITION_FAILED
    };
    Ok((
        code,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        result.log_text(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{body_string, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use gantry_core::{BuildResult, StatusKey};
    use tower::ServiceExt;

    fn result(ok: bool) -> BuildResult {
        BuildResult {
            ok,
            sha: "ab12cd34ef56".to_string(),
            log: vec!["- build".to_string(), "[passed] make (3s)".to_string()],
            seconds: 3,
        }
    }

    #[tokio::test]
    async fn test_plain_text_status_codes() {
        let (state, backend) = state();
        let app = crate::routes::router(state);
        let key = StatusKey::new("main", "acme/widgets");

        backend.store.put_result(&key, &result(true)).await.unwrap();
        let response = app
            .clone()
            .oneshot(Request::get("/status/main:acme/widgets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "- build\n[passed] make (3s)");

        backend.store.put_result(&key, &result(false)).await.unwrap();
        let response = app
            .oneshot(Request::get("/status/main:acme/widgets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_json_status_is_idempotent() {
        let (state, backend) = state();
        let app = crate::routes::router(state);
        let key = StatusKey::new("main", "acme/widgets");
        backend.store.put_result(&key, &result(false)).await.unwrap();

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/status/main:acme/widgets")
                        .header(header::ACCEPT, "application/json")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            bodies.push(body_string(response).await);
        }
        assert_eq!(bodies[0], bodies[1]);

        let parsed: BuildResult = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(parsed, result(false));
    }

    #[tokio::test]
    async fn test_unknown_key_is_404() {
        let (state, _) = state();
        let app = crate::routes::router(state);
        let response = app
            .oneshot(Request::get("/status/main:acme/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_key_without_branch_is_404() {
        let (state, _) = state();
        let app = crate::routes::router(state);
        let response = app
            .oneshot(Request::get("/status/widgets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wildcard_accept_gets_json() {
        let (state, backend) = state();
        let app = crate::routes::router(state);
        let key = StatusKey::new("main", "acme/widgets");
        backend.store.put_result(&key, &result(false)).await.unwrap();

        let response = app
            .oneshot(
                Request::get("/status/main:acme/widgets")
                    .header(header::ACCEPT, "*/*")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: BuildResult = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(!parsed.ok);
    }
}
