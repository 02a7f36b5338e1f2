//! Binary entry point: argument parsing, logging setup, one limiter run.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use altspeed::{Config, Limits, RpcEndpoint, SampleStore, ThrottleEngine, TransmissionClient};

/// Throttle Transmission when a sliding-window data cap is exceeded.
///
/// Run from cron; every invocation samples the daemon's cumulative
/// transfer counters and flips alt-speed mode when any configured limit
/// has been blown since its window started.
#[derive(Parser, Debug)]
#[command(name = "altspeed", version, about)]
struct Cli {
    /// Path to the SQLite usage database (created if missing)
    #[arg(long)]
    sqlite_file: PathBuf,

    /// Base URL of the Transmission RPC endpoint, e.g. http://localhost:9091
    #[arg(long)]
    transmission_url: String,

    /// Env file providing TRANSMISSION_USERNAME / TRANSMISSION_PASSWORD
    #[arg(long)]
    env_file: PathBuf,

    /// Daily data cap, e.g. 10g
    #[arg(long)]
    daily_limit: Option<String>,

    /// Weekly data cap, e.g. 50g
    #[arg(long)]
    weekly_limit: Option<String>,

    /// Monthly data cap, e.g. 150g
    #[arg(long)]
    monthly_limit: Option<String>,

    /// Log at debug verbosity
    #[arg(long)]
    debug: bool,

    /// Delete samples older than the current monthly reset boundary
    #[arg(long)]
    clear_old_data: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    // Limits are validated before any I/O happens.
    let limits = Limits::parse(
        cli.daily_limit.as_deref(),
        cli.weekly_limit.as_deref(),
        cli.monthly_limit.as_deref(),
    )?;

    dotenvy::from_path(&cli.env_file)
        .with_context(|| format!("cannot load env file {}", cli.env_file.display()))?;
    let username = std::env::var("TRANSMISSION_USERNAME").ok();
    let password = std::env::var("TRANSMISSION_PASSWORD").ok();

    let endpoint = RpcEndpoint::parse(&cli.transmission_url, username, password)?;

    Ok(Config {
        sqlite_file: cli.sqlite_file.clone(),
        endpoint,
        limits,
        clear_old_data: cli.clear_old_data,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = build_config(&cli)?;
    let store = SampleStore::open(&config.sqlite_file)?;
    let client = TransmissionClient::new(config.endpoint.clone());
    let engine = ThrottleEngine::new(store, config.limits, config.clear_old_data);

    engine.run(&client, Utc::now()).await?;
    Ok(())
}
