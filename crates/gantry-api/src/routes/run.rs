//! Ad-hoc script runs against an uploaded archive.
//!
//! `POST /run/{script}` takes a multipart `tgz` field, unpacks it into a
//! scratch directory and runs `{script}` from it. `X-Var-*` headers become
//! environment variables (`X-Var-Foo` -> `FOO`), next to `HOST` and
//! `CALLBACK`. The reply is the run log, as text (200/412) or as JSON.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use gantry_config::BuildEnvironmentBuilder;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::wants_json;
use crate::AppState;
use crate::error::ApiError;

const TOKEN_HEADER: &str = "x-token";
const VAR_PREFIX: &str = "x-var-";
const ARCHIVE_FIELD: &str = "tgz";
const UNPACK: &str = "mkdir uploaded && tar zxf upload.tgz -C uploaded";

pub fn router() -> Router<AppState> {
    Router::new().route("/run/{script}", post(run_script))
}

#[derive(Debug, Error)]
enum RunError {
    #[error("no {ARCHIVE_FIELD} upload in the request")]
    MissingArchive,

    #[error("unable to read the upload -> {0}")]
    Upload(String),

    #[error("unable to open the archive (bogus payload ?)")]
    BadArchive,

    #[error("unable to find {0} (check your scripts)")]
    MissingScript(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl RunError {
    fn log_line(&self) -> String {
        match self {
            RunError::Io(_) | RunError::Unexpected(_) => format!("unexpected failure ({})", self),
            _ => format!("failure ({})", self),
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    ok: bool,
    log: Vec<String>,
}

async fn run_script(
    State(state): State<AppState>,
    Path(script): Path<String>,
    headers: HeaderMap,
    upload: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let expected = state.config.run.token.as_deref();
    let given = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if expected.is_none() || given != expected {
        warn!(script = %script, "Rejected script run with a bad token");
        return Err(ApiError::Forbidden("invalid token".to_string()));
    }

    let vars = script_vars(&headers);
    let mut report = RunReport {
        ok: false,
        log: vec![format!("running {}...", script)],
    };
    report
        .log
        .extend(vars.iter().map(|(key, value)| format!("${} = {}", key, value)));

    match execute(&state, &script, upload, vars).await {
        Ok((ok, lines)) => {
            report.ok = ok;
            report.log.extend(lines);
        }
        Err(e) => report.log.push(e.log_line()),
    }
    info!(script = %script, ok = report.ok, "Script run finished");

    if wants_json(&headers) {
        return Ok(Json(report).into_response());
    }

    let code = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::PRECONDITION_FAILED
    };
    Ok((
        code,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        report.log.join("\n"),
    )
        .into_response())
}

/// `X-Var-*` headers as upper-cased variable names.
fn script_vars(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(VAR_PREFIX)?;
            let value = value.to_str().ok()?;
            (!key.is_empty()).then(|| (key.to_uppercase(), value.to_string()))
        })
        .collect()
}

/// Script names are a single plain file name.
fn is_plain_name(script: &str) -> bool {
    !script.starts_with('.')
        && script
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

async fn read_archive(upload: Result<Multipart, MultipartRejection>) -> Result<Vec<u8>, RunError> {
    let mut upload = upload.map_err(|e| RunError::Upload(e.body_text()))?;
    while let Some(field) = upload
        .next_field()
        .await
        .map_err(|e| RunError::Upload(e.body_text()))?
    {
        if field.name() == Some(ARCHIVE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| RunError::Upload(e.body_text()))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(RunError::MissingArchive)
}

/// Unpack the upload and run the script; the scratch directory goes away
/// on return.
async fn execute(
    state: &AppState,
    script: &str,
    upload: Result<Multipart, MultipartRejection>,
    vars: BTreeMap<String, String>,
) -> Result<(bool, Vec<String>), RunError> {
    let archive = read_archive(upload).await?;
    let scratch = tempfile::tempdir()?;
    tokio::fs::write(scratch.path().join("upload.tgz"), archive).await?;

    let unpacked = state
        .scripts
        .run(UNPACK, scratch.path(), &Default::default())
        .await
        .map_err(|e| RunError::Unexpected(e.to_string()))?;
    if !unpacked.success() {
        return Err(RunError::BadArchive);
    }

    let cwd = scratch.path().join("uploaded");
    if !is_plain_name(script) || !cwd.join(script).is_file() {
        return Err(RunError::MissingScript(script.to_string()));
    }

    let config = &state.config;
    let callback = config.callback_url(&uuid::Uuid::new_v4().to_string());
    let env = vars.into_iter().fold(
        BuildEnvironmentBuilder::new()
            .with_host(config.host.as_deref())
            .with_callback(callback),
        |env, (key, value)| env.with_var(key, value),
    );

    let started = Instant::now();
    let output = state
        .scripts
        .run(
            &format!("{} {}", config.run.interpreter, script),
            &cwd,
            &env.build(),
        )
        .await
        .map_err(|e| RunError::Unexpected(e.to_string()))?;

    let ok = output.success();
    let mut lines = output.lines;
    lines.push(format!(
        "script run in {} seconds",
        started.elapsed().as_secs()
    ));
    Ok((ok, lines))
}
