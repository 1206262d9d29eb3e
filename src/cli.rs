//! CLI definitions for dsched.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dsched CLI.
#[derive(Parser)]
#[command(name = "dsched")]
#[command(about = "Run periodic jobs on every replica, execute each tick on one")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Drive every configured job in the foreground (default)
    Run,

    /// Validate the configuration and print resolved triggers
    Check,

    /// Show the lock holder and last execution record of a job
    Status {
        /// Schedule key
        key: String,
    },

    /// Remove the execution record of a job left running by a crashed replica
    Clear {
        /// Schedule key
        key: String,
    },
}
