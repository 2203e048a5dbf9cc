//! Basher CLI - Run bash scripts with host commands exported back to them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use basher::basher_host::DispatchEnvelope;

mod commands;
mod config;

/// Environment variable carrying the log filter into callbacks.
pub const LOG_ENV: &str = "BASHER_LOG";

/// Run a shell function from bash scripts
#[derive(Parser)]
#[command(name = "basher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scripts to source, in order
    pub scripts: Vec<PathBuf>,

    /// Arguments passed to the function
    #[arg(last = true)]
    pub args: Vec<String>,

    /// Shell function to call after sourcing
    #[arg(short, long)]
    pub function: Option<String>,

    /// Bash executable (default: $SHELL if it is bash, else /bin/bash)
    #[arg(short, long)]
    pub interpreter: Option<PathBuf>,

    /// Kill the run after this many milliseconds
    #[arg(short, long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Start bash with an empty environment
    #[arg(long)]
    pub no_copy_env: bool,

    /// Export a variable into the script (repeatable)
    #[arg(
        short = 'e',
        long = "env",
        value_name = "NAME=VALUE",
        value_parser = config::parse_env_pair
    )]
    pub env: Vec<(String, String)>,

    /// Keep the staged script on disk and log its path
    #[arg(short, long)]
    pub debug: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print a run report to stderr
    #[arg(short, long, default_value = "none")]
    pub report: ReportFormat,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Run report formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// No report
    #[default]
    None,
    /// Human-readable text
    Human,
    /// Pretty JSON
    Json,
}

/// Build the log filter for a verbosity level.
///
/// `BASHER_LOG` wins over `RUST_LOG`, so callbacks log like their parent.
fn log_directive(verbose: u8) -> String {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        return directive;
    }
    if let Ok(directive) = std::env::var(EnvFilter::DEFAULT_ENV) {
        return directive;
    }
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("basher={}", level)
}

fn init_logging(directive: &str) {
    let filter =
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("basher=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Truncate a status to its low byte, as the shell does for `exit`.
fn exit_code(status: i32) -> ExitCode {
    ExitCode::from((status & 0xff) as u8)
}

fn main() -> ExitCode {
    // Callbacks from a running script must be served before argument
    // parsing: their argv is not ours.
    let argv: Vec<String> = std::env::args().collect();
    if DispatchEnvelope::is_dispatch(&argv) {
        init_logging(&log_directive(0));
        return exit_code(commands::exports::dispatch(&argv));
    }

    let cli = Cli::parse();
    let directive = log_directive(cli.verbose);
    init_logging(&directive);

    match commands::run::execute(cli, &directive) {
        Ok(status) => exit_code(status),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
