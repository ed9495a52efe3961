//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// recurd - run shell commands forever at a fixed interval
#[derive(Parser)]
#[command(
    name = "recurd",
    about = "Recurring job runner with failure-isolated loops",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/recurd/logs/recurd.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Schedule every enabled job and run until Ctrl+C
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long, value_name = "SECS")]
        for_secs: Option<u64>,
    },

    /// Validate the config and list the jobs it defines
    Check {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a single job once and report the result
    Once {
        /// Job name from the config file
        job: String,
    },

    /// Show recent outcomes from the JSONL log
    History {
        /// Only show records for this job
        #[arg(short, long)]
        job: Option<String>,

        /// Number of records to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for check/history commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the tracing log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recurd")
        .join("logs")
        .join("recurd.log")
}
