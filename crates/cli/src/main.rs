//! fetchonce command-line entry point.
//!
//! Payload summaries and listings go to stdout. Progress lines and logs go
//! to stderr.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fetchonce_core::AppConfig;

mod cli;
mod commands;
mod output;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = match &args.config {
        Some(path) => AppConfig::load_from(Some(path.display().to_string()))?,
        None => AppConfig::load()?,
    };
    tracing::debug!(db_path = %config.db_path.display(), "configuration loaded");

    let all_ok = commands::run(args.command, &config).await?;

    Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
