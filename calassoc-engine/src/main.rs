//! Calibration association worker (calassoc-worker) - Main entry point
//!
//! Hosts the refresh worker pool against the archive database. Also offers a
//! few operator commands for the refresh queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use calassoc_common::config::{load_or_default, resolve_root_folder};
use calassoc_common::db::init_database;
use calassoc_engine::{
    AssociationCache, EngineContext, EngineSettings, RefreshQueue, RefreshWorker, SqliteStore,
    WorkerPool,
};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for calassoc-worker
#[derive(Parser, Debug)]
#[command(name = "calassoc-worker")]
#[command(about = "Calibration association refresh worker")]
#[command(version)]
struct Args {
    /// Root folder holding the archive database
    #[arg(short, long, env = "CALASSOC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "CALASSOC_CONFIG")]
    config: Option<PathBuf>,

    /// Worker count, overriding [workers] count
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the worker pool until interrupted (default)
    Run,
    /// Process the queue to empty and exit
    Drain,
    /// Print failed queue entries as JSON
    Failed,
    /// Return failed entries to pending
    Retry,
    /// Print queue counts
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "calassoc_engine={level},calassoc_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let mut settings =
        EngineSettings::from_toml(&config, &root_folder).context("Invalid configuration")?;
    if let Some(workers) = args.workers {
        settings.workers.worker_count = usize::from(workers);
    }

    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", settings.database_path.display());

    let pool = init_database(&settings.database_path)
        .await
        .context("Failed to initialize database")?;

    let queue = RefreshQueue::new(pool.clone());
    let ctx = EngineContext {
        store: Arc::new(SqliteStore::new(pool.clone())),
        evaluator: Arc::new(settings.evaluator()),
        cache: AssociationCache::new(pool.clone()),
        queue: queue.clone(),
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let workers = WorkerPool::start(ctx, &settings.workers);
            shutdown_signal().await;
            workers.shutdown().await;
        }
        Command::Drain => {
            let stats = RefreshWorker::new(ctx)
                .drain()
                .await
                .context("Drain failed")?;
            println!(
                "{}",
                serde_json::json!({
                    "refreshed": stats.refreshed,
                    "cleared": stats.cleared,
                    "failed": stats.failed,
                })
            );
        }
        Command::Failed => {
            let entries = queue.list_failed().await.context("Failed to list entries")?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Retry => {
            let retried = queue.retry_failed().await.context("Retry failed")?;
            println!("{}", serde_json::json!({ "retried": retried }));
        }
        Command::Status => {
            let pending = queue.pending_count().await?;
            let in_progress = queue.in_progress_count().await?;
            let failed = queue.list_failed().await?.len();
            println!(
                "{}",
                serde_json::json!({
                    "pending": pending,
                    "in_progress": in_progress,
                    "failed": failed,
                })
            );
        }
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
