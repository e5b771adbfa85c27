//! CLI command definitions and subcommands

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TaskCore - scheduled task lifecycle and shipping-rate reconciliation
#[derive(Parser)]
#[command(
    name = "tc",
    about = "Schedule, start and stop purchase tasks against an automation worker",
    version,
    after_help = "Logs are written to: ~/.local/share/taskcore/logs/taskcore.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Classify a product string and print it as JSON
    Parse {
        /// Link, variant code or keyword expression (e.g. "+red -suede")
        #[arg(value_name = "RAW")]
        raw: String,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Create tasks and run the scheduler against a dry-run worker until Ctrl-C
    Run {
        /// Product string
        #[arg(short, long)]
        product: String,

        /// Store URL; "supreme" in the URL selects the Supreme platform
        #[arg(short, long)]
        store_url: String,

        /// Scheduled start (RFC 3339); without it tasks start immediately
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Number of task copies
        #[arg(short, long, default_value = "1")]
        amount: u32,
    },
}

/// Path of the log file written by the binary
pub fn log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskcore")
        .join("logs")
        .join("taskcore.log")
}
