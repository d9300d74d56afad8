//! Rezoning API Server
//!
//! Serves filter tiles and LCOE zone scores over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use rezoning_api::build_router;
use rezoning_api::state::AppState;

/// Rezoning API Server
#[derive(Parser, Debug)]
#[command(name = "rezoning-api")]
#[command(about = "Renewable energy zoning: filter tiles and LCOE zone scores")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDR")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Number of worker threads
    #[arg(long, env = "TOKIO_WORKER_THREADS")]
    worker_threads: Option<usize>,
}

fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let result = runtime_builder
        .build()
        .context("failed to create Tokio runtime")
        .and_then(|runtime| runtime.block_on(run_server(args)));

    if let Err(e) = result {
        error!(error = %e, "Rezoning API exited with an error");
        std::process::exit(1);
    }
}

async fn run_server(args: Args) -> Result<()> {
    info!("Starting rezoning API server");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install metrics recorder: {}", e))?;

    let state = AppState::from_env()
        .context("failed to initialize application state")?
        .with_prometheus(prometheus);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen))?;

    info!("Rezoning API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
