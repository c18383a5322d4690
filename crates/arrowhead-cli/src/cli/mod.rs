//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::{Context as _, Result};
use args::{Cli, Commands};
use clap::Parser;

use arrowhead::tls::TlsDefaults;

use crate::config;
use crate::output::OutputFormat;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings_path = config::resolve_path(cli.config.as_deref())?;
    let settings = config::load(&settings_path)?;

    let ctx = commands::Context {
        settings,
        settings_path,
        output_format: cli.output.unwrap_or(OutputFormat::Pretty),
        tls_defaults: TlsDefaults::from_env(),
        verbose: cli.verbose > 0,
    };

    match cli.command {
        Commands::Onboard(args) => commands::onboard::execute(ctx, args).await,
        Commands::Registry(args) => commands::registry::execute(ctx, args).await,
        Commands::Config(args) => commands::config::execute(ctx, args).await,
    }
}

/// Install the tracing subscriber; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
