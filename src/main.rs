//! QuizPulse API Server
//!
//! Run with: cargo run --bin quizpulse
//!
//! # Configuration
//!
//! Read from `--config`, otherwise the first of
//! `~/.config/quizpulse/config.toml`, `/etc/quizpulse/config.toml` and
//! `./config.toml`. Environment variables override file values:
//! - `QUIZPULSE_STORE_BACKEND`: `memory` or `sqlite` (default: sqlite)
//! - `QUIZPULSE_DATA_DIR`: Directory for the SQLite store
//! - `QUIZPULSE_STORE_CAP`: Maximum retained events, 0 for unbounded (default: 10000)
//! - `QUIZPULSE_REMOTE_URL` / `QUIZPULSE_REMOTE_KEY`: Remote event table
//! - `QUIZPULSE_API_HOST` / `QUIZPULSE_API_PORT`: Bind address (default: 0.0.0.0:8086)
//! - `QUIZPULSE_DASHBOARD_SECRET`: Credential for the read endpoints
//! - `QUIZPULSE_UTC_OFFSET_MINUTES`: Zone used for day buckets
//! - `RUST_LOG`: Log filter (default: quizpulse=info)

use clap::Parser;
use quizpulse::api::{serve, AppState};
use quizpulse::config::Config;
use quizpulse::logging::init_logging;
use quizpulse::store::{open_store, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "quizpulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quiz funnel event collector and analytics API")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(port) = args.port {
        config.api.port = port;
    }

    init_logging(&config.logging);

    tracing::info!("Starting QuizPulse v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        backend = ?config.store.backend,
        cap = config.store.cap,
        "Opening event store"
    );

    let store = Arc::new(open_store(&config, Arc::new(SystemClock))?);
    spawn_diagnostics_logger(&store);

    let state = AppState::from_config(Arc::clone(&store), &config)?;

    serve(state, &config.api).await?;

    tracing::info!("QuizPulse server stopped");
    Ok(())
}

/// Log replica and fetch failures as they are reported by the store
fn spawn_diagnostics_logger(store: &quizpulse::store::EventStore) {
    let mut rx = store.subscribe_diagnostics();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(failure) => tracing::warn!(
                    backend = %failure.backend,
                    operation = ?failure.operation,
                    reason = %failure.reason,
                    "Backend failure"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped backend diagnostics")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
