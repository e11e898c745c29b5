//! CLI module for BFPU
//!
//! Parses the command line into logging options, a configuration source and
//! session flags. Flags are merged over the configuration file by
//! [`args::SessionArgs::apply`].

use clap::Parser;
use std::path::PathBuf;

pub mod args;

pub use args::SessionArgs;

/// Batch file processing utility
///
/// Walks a source directory, applies the configured actions to every matched
/// file and writes results to a mirrored destination tree.
#[derive(Parser, Debug)]
#[command(name = "bfpu")]
#[command(about = "Batch file processing utility - apply actions to every file in a tree")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level or filter directive, overridden by RUST_LOG
    #[arg(long, default_value = "info", env = "BFPU_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: pretty, compact or json
    #[arg(long, default_value = "pretty", env = "BFPU_LOG_FORMAT")]
    pub log_format: String,

    /// TOML configuration file
    #[arg(short, long, env = "BFPU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Configuration override as KEY=VALUE, e.g. command-line.command="cp %source% %target%"
    #[arg(
        short = 'D',
        long = "property",
        value_name = "KEY=VALUE",
        env = "BFPU_PROPERTIES",
        value_delimiter = ';'
    )]
    pub properties: Vec<String>,

    #[command(flatten)]
    pub session: SessionArgs,
}
