//! Push webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use gantry_core::BuildRequest;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(github_webhook))
        .route("/webhooks/github", post(github_webhook))
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // Bare POSTs without an event header are treated as pushes.
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");

    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        if !verify_github_signature(secret, &body, signature) {
            warn!(event = %event_type, "Invalid webhook signature");
            return Err(ApiError::Forbidden("invalid signature".to_string()));
        }
    }

    match event_type {
        "push" => {}
        "ping" => {
            info!("Ping event received - webhook is configured correctly");
            return Ok((StatusCode::OK, Json(json!({ "status": "pong" }))));
        }
        _ => {
            info!(event = %event_type, "Unhandled event type");
            return Ok((StatusCode::ACCEPTED, Json(json!({ "status": "ignored" }))));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let Some(request) = BuildRequest::from_push_payload(&payload)? else {
        info!("Push carries nothing to build");
        return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
    };

    let key = request.key();
    state.store.put_payload(&key, &payload).await?;
    let shard = state.dispatcher.dispatch(&request).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "queued",
            "key": key.to_string(),
            "build_id": request.id,
            "shard": shard,
        })),
    ))
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
