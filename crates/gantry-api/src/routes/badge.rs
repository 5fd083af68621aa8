//! SVG status badge.

use askama::Template;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use gantry_core::result::{BADGE_LINE_WIDTH, NOT_INDEXED_TAGLINE};
use gantry_core::{BuildResult, StatusKey};

use crate::AppState;
use crate::error::ApiError;

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, post-check=0, pre-check=0, max-age=0";

const CHAR_WIDTH: u32 = 7;
const LINE_HEIGHT: u32 = 14;
const PADDING: u32 = 8;
const HEADER_HEIGHT: u32 = 22;

const PASSED: &str = "#4c1";
const FAILED: &str = "#e05d44";
const UNKNOWN: &str = "#9f9f9f";

pub fn router() -> Router<AppState> {
    Router::new().route("/svg/{*key}", get(badge))
}

struct BadgeLine {
    y: u32,
    text: String,
}

#[derive(Template)]
#[template(path = "badge.svg")]
struct BadgeTemplate {
    width: u32,
    height: u32,
    header_height: u32,
    padding: u32,
    tagline_y: u32,
    color: &'static str,
    tagline: String,
    lines: Vec<BadgeLine>,
}

impl BadgeTemplate {
    fn new(tagline: String, color: &'static str, log: Vec<String>) -> Self {
        let lines = log
            .into_iter()
            .enumerate()
            .map(|(i, text)| BadgeLine {
                y: HEADER_HEIGHT + PADDING + LINE_HEIGHT * (i as u32 + 1),
                text,
            })
            .collect::<Vec<_>>();

        Self {
            width: PADDING * 2 + CHAR_WIDTH * BADGE_LINE_WIDTH as u32,
            height: HEADER_HEIGHT + PADDING * 2 + LINE_HEIGHT * lines.len() as u32,
            header_height: HEADER_HEIGHT,
            padding: PADDING,
            tagline_y: 15,
            color,
            tagline,
            lines,
        }
    }

    fn for_result(result: Option<&BuildResult>) -> Self {
        match result {
            Some(result) => Self::new(
                result.tagline(),
                if result.ok { PASSED } else { FAILED },
                result.clipped_log(),
            ),
            None => Self::new(NOT_INDEXED_TAGLINE.to_string(), UNKNOWN, Vec::new()),
        }
    }
}

/// Render the badge for `{branch}:{repository}`.
///
/// Keys that were never built, or that do not parse, still get a badge.
async fn badge(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let result = match key.parse::<StatusKey>() {
        Ok(key) => state.store.result(&key).await?,
        Err(_) => None,
    };

    let template = BadgeTemplate::for_result(result.as_ref());
    let svg = template.render().map_err(|e| {
        tracing::error!("Badge template render error: {}", e);
        ApiError::Internal("failed to render badge".to_string())
    })?;

    let last_modified = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml".to_string()),
            (header::CACHE_CONTROL, NO_CACHE.to_string()),
            (header::EXPIRES, "-1".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::LAST_MODIFIED, last_modified),
        ],
        svg,
    )
        .into_response())
}
