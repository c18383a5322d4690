//! Command-line argument definitions using clap.

use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Onboard devices into an Arrowhead local cloud and talk to its service
/// registry.
///
/// TLS stores, the onboarding controller and endpoint overrides are read
/// from the settings file (see `ahctl config path`).
#[derive(Parser, Debug)]
#[command(name = "ahctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (default: platform config directory)
    #[arg(short, long, env = "AHCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain a device certificate from the onboarding controller
    Onboard(OnboardArgs),

    /// Query and update the service registry
    Registry(RegistryArgs),

    /// Inspect the settings file
    Config(ConfigArgs),
}

// ============================================================================
// Onboard command
// ============================================================================

#[derive(Args, Debug)]
pub struct OnboardArgs {
    /// Common name to request for this device
    #[arg(short, long)]
    pub name: Option<String>,

    /// Onboarding controller host, overrides the settings file
    #[arg(long)]
    pub address: Option<String>,

    /// Onboarding controller port, overrides the settings file
    #[arg(long)]
    pub port: Option<u16>,

    /// Skip server certificate validation during onboarding
    #[arg(long)]
    pub insecure: bool,

    /// Permit --insecure (same as allow_insecure_bootstrap in the settings file)
    #[arg(long)]
    pub allow_insecure_bootstrap: bool,

    /// Write the issued identity and the cloud trust chain to this directory
    #[arg(long, value_name = "DIR")]
    pub save: Option<PathBuf>,
}

// ============================================================================
// Registry command
// ============================================================================

#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Service registry base URL (default: `service_registry` in [endpoints])
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: RegistryCommands,
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommands {
    /// Find providers of a service
    Query {
        /// Service definition name
        service: String,

        /// Required interface (repeatable)
        #[arg(short, long)]
        interface: Vec<String>,

        /// Ask the registry to ping providers first
        #[arg(long)]
        ping: bool,
    },

    /// Register a service from a JSON entry file
    Register {
        /// Service registry entry (JSON)
        file: PathBuf,
    },

    /// Remove a service described by a JSON entry file
    Remove {
        /// Service registry entry (JSON)
        file: PathBuf,
    },
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the settings in effect (passwords omitted)
    Show,

    /// Show the settings file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_onboard() {
        let cli = Cli::try_parse_from([
            "ahctl", "-vv", "onboard", "--name", "thermometer-7", "--insecure",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Onboard(args) => {
                assert_eq!(args.name.as_deref(), Some("thermometer-7"));
                assert!(args.insecure);
                assert!(!args.allow_insecure_bootstrap);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_registry_query() {
        let cli = Cli::try_parse_from([
            "ahctl",
            "--output",
            "json",
            "registry",
            "query",
            "temperature",
            "-i",
            "HTTPS-SECURE-JSON",
        ])
        .unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::Registry(RegistryArgs {
                command: RegistryCommands::Query { service, interface, ping },
                ..
            }) => {
                assert_eq!(service, "temperature");
                assert_eq!(interface, vec!["HTTPS-SECURE-JSON"]);
                assert!(!ping);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
