//! # arrowhead-cli
//!
//! Command-line front end for the Arrowhead secure-bootstrap client.
//!
//! - **Onboarding**: obtain a device certificate and the core system endpoints
//! - **Service registry**: query, register and remove services
//! - **Settings**: show the settings file in effect and where it lives

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
