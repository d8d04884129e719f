//! FRED MCP server binary.
//!
//! Run with: `FRED_API_KEY=... fredmcp`

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fredmcp::{Config, Server, ToolContext};

#[derive(Parser, Debug)]
#[command(name = "fredmcp")]
#[command(about = "MCP server for FRED economic time-series tools")]
#[command(version)]
struct Args {
    /// FRED API key. Required; get one at
    /// https://fred.stlouisfed.org/docs/api/api_key.html
    #[arg(long, env = "FRED_API_KEY", default_value = "", hide_env_values = true)]
    fred_api_key: String,

    /// Root directory for series files and dataset folders
    #[arg(long, env = "FRED_DATA_ROOT", default_value = "./FRED_Data")]
    data_root: String,

    /// Maximum number of tool invocations executing in parallel
    #[arg(long, env = "FRED_WORKER_LIMIT", default_value = "4")]
    worker_limit: usize,

    /// Per-build cap on concurrent series fetches
    #[arg(long, env = "FRED_FETCH_CONCURRENCY", default_value = "4")]
    fetch_concurrency: usize,

    /// Gateway retry budget for rate-limited or unavailable upstream
    #[arg(long, env = "FRED_RETRY_ATTEMPTS", default_value = "4")]
    retry_attempts: u32,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // stdout carries the protocol; everything observable goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::new(args.fred_api_key, args.data_root) {
        Ok(config) => config
            .with_worker_limit(args.worker_limit)
            .with_fetch_concurrency(args.fetch_concurrency)
            .with_retry_attempts(args.retry_attempts),
        Err(err) => {
            tracing::error!(%err, "fatal configuration error");
            return std::process::ExitCode::FAILURE;
        },
    };

    let context = match ToolContext::new(config) {
        Ok(context) => Arc::new(context),
        Err(err) => {
            tracing::error!(%err, "failed to initialise components");
            return std::process::ExitCode::FAILURE;
        },
    };

    tracing::info!(
        data_root = %context.config.data_root.display(),
        workers = context.config.worker_limit,
        "starting FRED MCP server on stdio"
    );

    match Server::new(context).run_stdio().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "session ended with error");
            std::process::ExitCode::FAILURE
        },
    }
}
