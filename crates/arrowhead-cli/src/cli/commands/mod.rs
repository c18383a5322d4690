//! Command implementations.

pub mod config;
pub mod onboard;
pub mod registry;

use std::path::PathBuf;

use arrowhead::settings::Settings;
use arrowhead::tls::TlsDefaults;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Settings in effect
    pub settings: Settings,

    /// Where the settings were loaded from
    pub settings_path: PathBuf,

    /// Output format
    pub output_format: OutputFormat,

    /// TLS defaults read from the environment; the settings file overrides them
    pub tls_defaults: TlsDefaults,

    /// Verbose output
    pub verbose: bool,
}
