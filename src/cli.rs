// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::CommandId;

/// Command-line arguments for `sigil`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sigil",
    version,
    about = "Run named shell commands and stream their output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `SIGIL_CONFIG`, or `Sigil.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Command ids to run. Runs every configured command if omitted.
    #[arg(value_name = "ID")]
    pub ids: Vec<CommandId>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIGIL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config and print it, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// List configured commands and exit.
    #[arg(long)]
    pub list: bool,

    /// Print engine events as JSON lines instead of plain text.
    #[arg(long)]
    pub json: bool,
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

impl LogLevel {
    /// The level as an `EnvFilter` directive.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
