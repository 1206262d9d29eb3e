//! dsched - guarded periodic jobs for replicated services
//!
//! Main entry point for the dsched CLI.

mod cli;
mod service;
mod shell;
mod trigger;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dsched_config::ConfigLoader;

use crate::cli::{Cli, Commands};

/// Get the .dsched directory path.
fn dsched_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".dsched"))
        .unwrap_or_else(|| PathBuf::from(".dsched"))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.dsched/logs/ with daily rotation.
fn init_tracing() -> anyhow::Result<()> {
    let log_dir = dsched_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dsched")
        .filename_suffix("log")
        .max_log_files(14)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the background writer alive for the program duration
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config_path = PathBuf::from(ConfigLoader::expand_path(&cli.config.to_string_lossy()));
    let config = ConfigLoader::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => service::run(config).await,
        Commands::Check => service::check(&config),
        Commands::Status { key } => service::status(&config, &key).await,
        Commands::Clear { key } => service::clear(&config, &key).await,
    }
}
