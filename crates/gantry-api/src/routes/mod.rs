//! API routes.

pub mod badge;
pub mod builds;
pub mod callback;
pub mod health;
pub mod run;
pub mod status;
pub mod webhooks;

use crate::AppState;
use axum::Router;
use axum::http::{HeaderMap, header};

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(webhooks::router())
        .merge(builds::router())
        .merge(status::router())
        .merge(badge::router())
        .merge(callback::router())
        .merge(health::router())
        .merge(run::router())
        .with_state(state)
}

/// Whether the `Accept` header takes `application/json`.
///
/// The most specific matching range decides: `application/json`, then
/// `application/*`, then `*/*`. A missing header means plain text.
pub(crate) fn wants_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mut best: Option<(u8, f32)> = None;
    for range in accept.split(',') {
        let mut params = range.split(';');
        let media = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        let specificity = match media.as_str() {
            "application/json" => 2,
            "application/*" => 1,
            "*/*" => 0,
            _ => continue,
        };
        let quality = params
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if best.is_none_or(|(s, _)| specificity > s) {
            best = Some((specificity, quality));
        }
    }
    best.is_some_and(|(_, quality)| quality > 0.0)
}


#[cfg(test)]
pub(crate) mod test_support {
    use crate::AppState;
    use gantry_config::SystemConfig;
    use gantry_scheduler::{Backend, WorkerMonitor};
    use std::sync::Arc;

    pub fn state_with(config: SystemConfig) -> (AppState, Backend) {
        let backend = Backend::memory();
        let state = AppState::new(Arc::new(config), &backend, WorkerMonitor::default());
        (state, backend)
    }

    pub fn state() -> (AppState, Backend) {
        let mut config = SystemConfig::default();
        config.workers.shards = 2;
        state_with(config)
    }

    pub async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
