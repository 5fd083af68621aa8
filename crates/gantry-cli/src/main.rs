//! Gantry CLI tool.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gantry_config::SystemConfig;
use gantry_config::system::{DEFAULT_CONFIG_FILE, load_system_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry CI tools", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override the system configuration file.
#[derive(Args)]
struct ConfigArgs {
    /// System configuration file
    #[arg(long, global = true, env = "GANTRY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Number of shard queues
    #[arg(long, global = true, env = "GANTRY_SHARDS")]
    shards: Option<u32>,

    /// PostgreSQL URL for the shared queue and status store
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory holding the repository working copies
    #[arg(long, global = true, env = "GANTRY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(self) -> anyhow::Result<SystemConfig> {
        let mut config = load_system_config(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        if let Some(shards) = self.shards {
            config.workers.shards = shards;
        }
        if let Some(url) = self.database_url {
            config.database_url = Some(url);
        }
        if let Some(dir) = self.cache_dir {
            config.workers.cache_dir = dir;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process builds from the shared queue
    Worker {
        /// Only serve these shards (repeatable); all shards by default
        #[arg(long = "shard")]
        only: Vec<u32>,
    },
    /// Run a manifest against a local directory
    Run {
        /// Directory holding the manifest
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Branch used to select manifest blocks
        #[arg(long, default_value = "master")]
        branch: String,
        /// Commit reported in the build environment
        #[arg(long, default_value = "local")]
        commit: String,
    },
    /// Validate a manifest and print the blocks it selects
    Validate {
        /// Path to the manifest
        #[arg(default_value = gantry_config::DEFAULT_MANIFEST)]
        path: PathBuf,
        /// Only show blocks selected for this branch
        #[arg(long)]
        branch: Option<String>,
        /// Print the blocks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the shard a repository is routed to
    Shard {
        /// Repository full name, e.g. acme/widgets
        repository: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries command output
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config.load()?;

    match cli.command {
        Commands::Worker { only } => {
            commands::worker::run(config, only).await?;
        }
        Commands::Run {
            dir,
            branch,
            commit,
        } => {
            commands::run::run_local(&config, &dir, &branch, &commit).await?;
        }
        Commands::Validate { path, branch, json } => {
            commands::validate(&path, branch.as_deref(), json)?;
        }
        Commands::Shard { repository } => {
            commands::shard(&repository, config.workers.shards)?;
        }
    }

    Ok(())
}
