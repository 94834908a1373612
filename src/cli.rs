// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `eae-compute`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "eae-compute",
    version,
    about = "Run analytics jobs on this compute node: stage inputs, run the algorithm, upload outputs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `EAE_COMPUTE_CONFIG`, else `Compute.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Job to execute. Repeat to run several jobs concurrently.
    #[arg(long = "job", value_name = "ID", required = true)]
    pub job: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EAE_COMPUTE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config and print the invocations, but don't run
    /// anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
