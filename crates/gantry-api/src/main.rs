//! Gantry API server.

use anyhow::Context;
use clap::Parser;
use gantry_api::{AppState, routes};
use gantry_config::system::{DEFAULT_CONFIG_FILE, load_system_config};
use gantry_scheduler::{Backend, WorkerContext, WorkerMonitor, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gantry-server", version, about = "Gantry CI webhook and status server")]
struct Args {
    /// System configuration file
    #[arg(long, env = "GANTRY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, env = "GANTRY_LISTEN")]
    listen: Option<String>,

    /// Number of shard queues
    #[arg(long, env = "GANTRY_SHARDS")]
    shards: Option<u32>,

    /// PostgreSQL URL for the shared queue and status store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory holding the repository working copies
    #[arg(long, env = "GANTRY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = load_system_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(shards) = args.shards {
        config.workers.shards = shards;
    }
    if let Some(url) = args.database_url {
        config.database_url = Some(url);
    }
    if let Some(dir) = args.cache_dir {
        config.workers.cache_dir = dir;
    }
    let config = Arc::new(config);

    let backend = Backend::from_config(&config)
        .await
        .context("failed to open the queue backend")?;

    // Memory queues are process-local, so the pool runs in-process.
    let monitor = if backend.is_shared() {
        info!("Shared backend, run `gantry worker` to process builds");
        WorkerMonitor::default()
    } else {
        if config.workers.shards == 0 {
            warn!("No shards configured, builds will be rejected");
        }
        let ctx = Arc::new(WorkerContext::new(config.clone(), &backend));
        let pool = WorkerPool::spawn(ctx, 0..config.workers.shards);
        let monitor = pool.monitor();
        tokio::spawn(async move {
            if let Err(e) = pool.wait().await {
                error!(error = %e, "Worker pool stopped");
                std::process::exit(1);
            }
        });
        monitor
    };

    let state = AppState::new(config.clone(), &backend, monitor);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(
        listen = %config.server.listen,
        shards = config.workers.shards,
        backend = backend.queue.backend(),
        "Starting server"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
