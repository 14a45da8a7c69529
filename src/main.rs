//! Mesh Healer - trace collection and self-healing engine
//!
//! # Usage
//!
//! ```bash
//! # Run with ./mesh_healer.toml or built-in defaults
//! cargo run --release
//!
//! # Explicit config, JSON logs, no background healing
//! ./mesh-healer --config /etc/mesh-healer/mesh_healer.toml --log-json --no-monitor
//!
//! # Validate a config file and print the effective settings
//! ./mesh-healer --config mesh_healer.toml check-config
//! ```
//!
//! # Environment Variables
//!
//! - `MESH_HEALER_CONFIG`: Path to the TOML config
//! - `MESH_HEALER_ADDR`, `MESH_HEALER_DATA_DIR`, `MESH_HEALER_CORS_ORIGINS`,
//!   `MESH_HEALER_ALERT_WEBHOOK`: override the file
//! - `MESH_HEALER_LOG_JSON`: emit JSON logs
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_DB`: Set to "true" to wipe all persistent data on startup (for testing)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mesh_healer::api::create_app;
use mesh_healer::config::{ConfigSource, EngineConfig};
use mesh_healer::storage::{open_db, run_sweeper};
use mesh_healer::{BackgroundWorkers, Components};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "mesh-healer")]
#[command(about = "Distributed trace collection and self-healing engine")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config (default: $MESH_HEALER_CONFIG, then ./mesh_healer.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:4998")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the data directory holding the durable store
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Reset all persistent data (trace log, recovery records) on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MESH_HEALER_LOG_JSON")]
    log_json: bool,

    /// Do not start the health monitor (no automatic healing)
    #[arg(long)]
    no_monitor: bool,

    /// Do not start the snapshot scheduler
    #[arg(long)]
    no_snapshots: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Validate the configuration and print the effective settings as TOML
    CheckConfig,
}

// ============================================================================
// Database Reset
// ============================================================================

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Safely remove the data directory and all its contents.
fn reset_data_directory(data_path: &Path) -> Result<()> {
    if !data_path.exists() {
        info!("Data directory does not exist, nothing to reset");
        return Ok(());
    }

    warn!(path = %data_path.display(), "RESET_DB detected: wiping all persistent data");
    if let Ok(entries) = std::fs::read_dir(data_path) {
        for entry in entries.flatten() {
            warn!(path = %entry.path().display(), "Removing");
        }
    }

    std::fs::remove_dir_all(data_path).context("Failed to remove data directory")?;
    warn!("Data directory removed; a fresh database will be created on startup");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    IngestWriter,
    HealthMonitor,
    SnapshotScheduler,
    StoreSweeper,
    EventJournal,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::IngestWriter => write!(f, "IngestWriter"),
            TaskName::HealthMonitor => write!(f, "HealthMonitor"),
            TaskName::SnapshotScheduler => write!(f, "SnapshotScheduler"),
            TaskName::StoreSweeper => write!(f, "StoreSweeper"),
            TaskName::EventJournal => write!(f, "EventJournal"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the background loops selected by the CLI flags.
fn spawn_background(
    task_set: &mut JoinSet<Result<TaskName>>,
    components: &Arc<Components>,
    workers: BackgroundWorkers,
    args: &CliArgs,
    cancel_token: &CancellationToken,
) {
    let config = &components.config;
    let BackgroundWorkers {
        ingest_writer,
        journal_rx,
    } = workers;

    let token = cancel_token.clone();
    task_set.spawn(async move {
        ingest_writer.run(token).await;
        Ok(TaskName::IngestWriter)
    });

    let token = cancel_token.clone();
    let journal = components.journal.clone();
    task_set.spawn(async move {
        journal.run(journal_rx, token).await;
        Ok(TaskName::EventJournal)
    });

    let token = cancel_token.clone();
    let kv = components.kv.clone();
    let sweep = std::time::Duration::from_secs(config.storage.sweep_interval_secs);
    task_set.spawn(async move {
        run_sweeper(kv, sweep, token).await;
        Ok(TaskName::StoreSweeper)
    });

    if args.no_monitor || !config.monitor.enabled {
        warn!("Health monitor disabled: failing services will not be healed automatically");
    } else {
        let token = cancel_token.clone();
        let monitor = components.monitor.clone();
        task_set.spawn(async move {
            monitor.run(token).await;
            Ok(TaskName::HealthMonitor)
        });
    }

    if args.no_snapshots || !config.snapshot.enabled {
        info!("Snapshot scheduler disabled");
    } else {
        let token = cancel_token.clone();
        let snapshots = components.snapshots.clone();
        let interval = config.snapshot.interval();
        task_set.spawn(async move {
            snapshots.run_scheduler(interval, token).await;
            Ok(TaskName::SnapshotScheduler)
        });
    }
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let loops observe cancellation and drain (the ingest writer flushes its queue)
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: task {} stopped", task_name);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<(EngineConfig, ConfigSource)> {
    let (mut config, source) =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok((config, source))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let (config, source) = load_config(&args)?;

    if let Some(SubCommand::CheckConfig) = args.command {
        println!("# source: {source}");
        println!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    // Reset DB check, BEFORE any storage initialization
    if should_reset_db(args.reset_db) {
        reset_data_directory(&config.storage.data_dir)?;
    }

    info!(
        source = %source,
        services = config.topology.services.len(),
        addr = %config.server.addr,
        "Mesh Healer starting"
    );

    let db_path = config.storage.db_path();
    let db = open_db(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let server_addr = config.server.addr.clone();
    let (components, workers) =
        Components::build(config, &db).context("Failed to build engine components")?;
    let components = Arc::new(components);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("HTTP server listening on {}", server_addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(
        &mut task_set,
        listener,
        create_app(components.clone()),
        cancel_token.clone(),
    );
    spawn_background(&mut task_set, &components, workers, &args, &cancel_token);

    let result = run_supervisor(&mut task_set, cancel_token).await;

    if let Err(e) = db.flush_async().await {
        warn!(error = %e, "Failed to flush durable store on shutdown");
    }
    info!("Mesh Healer shutdown complete");
    result
}
