//! skillsync daemon - Periodic sync trigger and tool runner
//!
//! Subcommands:
//! - `run`: reconcile every `sync.poll_interval_minutes` until SIGINT/SIGTERM
//! - `sync`: one orchestrator run, report printed as JSON
//! - `tool`: invoke one query tool with JSON arguments
//! - `status`: print the current status snapshot

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skillsync_core::{config::Config, domain::CollectionId};
use skillsync_sync::RunRequest;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod service;

use service::{shutdown_signal, DaemonService};

#[derive(Debug, Parser)]
#[command(name = "skillsyncd", version, about = "Incremental Calendar and Drive cache sync")]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile periodically until interrupted
    Run,
    /// Run the orchestrator once
    Sync {
        /// Reconcile only this collection ("drive" for Drive)
        #[arg(long)]
        calendar: Option<String>,
        /// Ignore staleness when selecting collections
        #[arg(long)]
        force: bool,
        /// Discard cursors and list the full window
        #[arg(long)]
        full: bool,
    },
    /// Invoke a query tool
    Tool {
        name: String,
        /// Tool arguments as a JSON object
        args: Option<String>,
    },
    /// Print sync status
    Status,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(Config::default_path);
    let config = if path.exists() {
        Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration: {}", joined.join("; "));
    }
    Ok(config)
}

/// `RUST_LOG` wins over `logging.level`
fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_tool_args(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw).context("Tool arguments must be valid JSON"),
    }
}

fn sync_request(calendar: Option<String>, force: bool, full: bool) -> Result<RunRequest> {
    let mut request = match calendar {
        Some(id) => RunRequest::for_collection(CollectionId::new(id)?),
        None => RunRequest::periodic(),
    };
    if force {
        request = request.forced();
    }
    if full {
        request = request.full();
    }
    Ok(request)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    init_tracing(&config);

    let service = DaemonService::new(config).await?;

    let result = match cli.command {
        Commands::Run => {
            info!("skillsync daemon starting");
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_signal(shutdown.clone()));
            service.run_loop(shutdown).await
        }
        Commands::Sync {
            calendar,
            force,
            full,
        } => match sync_request(calendar, force, full) {
            Ok(request) => {
                let report = service.sync_once(request).await;
                print_json(&report)
            }
            Err(e) => Err(e),
        },
        Commands::Tool { name, args } => match parse_tool_args(args.as_deref()) {
            Ok(args) => {
                let output = service.tools().call(&name, args).await;
                print_json(&output)
            }
            Err(e) => Err(e),
        },
        Commands::Status => {
            let snapshot = service.orchestrator().status().await;
            print_json(&snapshot.to_flat_map())
        }
    };

    service.close().await;

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "skillsyncd exiting with error");
    }
    result
}
