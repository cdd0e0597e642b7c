//! CI benchmarker server

use anyhow::Context;
use cibench_api::{AppState, routes};
use cibench_config::SystemConfig;
use cibench_db::{Backoff, RetryPolicy, SqliteJobStore, StoreSettings};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "cibench-server")]
#[command(about = "Dispatches benchmark jobs to CI backends and records their latencies", long_about = None)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(long, env = "CIBENCH_CONFIG", default_value = "cibench.kdl")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let debug = std::env::var("DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn store_settings(config: &SystemConfig) -> StoreSettings {
    StoreSettings {
        path: PathBuf::from(&config.database.path),
        max_connections: config.database.max_connections,
        busy_timeout: config.database.busy_timeout,
        retry: RetryPolicy {
            max_attempts: config.retry.max_attempts,
            backoff: Backoff::Exponential {
                base: config.retry.base_delay,
            },
        },
        attempt_timeout: config.retry.attempt_timeout,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = SystemConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // Failing to open the store is fatal.
    let store = SqliteJobStore::open(store_settings(&config))
        .await
        .with_context(|| format!("failed to open job store {}", config.database.path))?;
    info!(path = %config.database.path, "Job store ready");

    let state = AppState::from_config(&config, Arc::new(store))?;
    if state.hades.is_none() {
        info!("Hades is not configured, /v1/benchmark/hades will answer 503");
    }

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Starting server on {}", config.server.address);
    let listener = TcpListener::bind(&config.server.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
