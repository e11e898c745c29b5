//! BFPU - batch file processing utility
//!
//! Applies named actions to every file of a source tree and mirrors the
//! results into a destination tree.
//!
//! # Usage
//!
//! ```bash
//! bfpu -s in -d out -a command-line -D 'command-line.command=cp %source% %target%'
//! bfpu -c session.toml --fail-tolerant -j 4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use bfpu::adapters::toml_config::TomlConfig;
use bfpu::app::{ActionRegistry, Dispatcher};
use bfpu::cli::Cli;
use bfpu::engine::CancelToken;
use bfpu::utils::logging::{LogFormat, LoggingConfig, LoggingSystem};

/// Main entry point for the BFPU CLI application
fn main() -> Result<()> {
    let cli = Cli::parse();

    LoggingSystem::new(LoggingConfig {
        level: cli.log_level.clone(),
        format: LogFormat::parse(&cli.log_format)?,
    })
    .initialize()?;

    info!("Starting BFPU {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        return Err(e);
    }

    info!("BFPU completed successfully");
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => TomlConfig::new(),
    };
    for property in &cli.properties {
        config
            .set_property(property)
            .with_context(|| format!("Invalid property override \"{}\"", property))?;
    }

    if let Some(path) = config.path() {
        info!("Using configuration {}", path.display());
    }

    let properties = cli.session.apply(config.session()?);
    let registry = ActionRegistry::with_builtin_actions();
    debug!(
        "Registered actions: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );
    Dispatcher::new(&registry)
        .with_interrupt(interrupt_on_ctrl_c()?)
        .run_session(&config, properties)
        .context("Session failed")?;
    Ok(())
}

/// First Ctrl-C cancels in-flight work; a second one exits at once
fn interrupt_on_ctrl_c() -> Result<CancelToken> {
    let interrupt = CancelToken::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || {
        if handler.is_cancelled() {
            std::process::exit(130);
        }
        warn!("Interrupted, abandoning in-flight files (press Ctrl-C again to exit now)");
        handler.cancel();
    })
    .context("Failed to install interrupt handler")?;
    Ok(interrupt)
}
