//! Onboarding bootstrap and service registry client for Arrowhead local clouds.
//!
//! An unprovisioned device builds an [`OnboardingConfig`], prepares an
//! [`OnboardingBootstrap`] over a [`Transport`] and runs it. The resulting
//! [`OnboardedClient`] carries the issued identity and the core system
//! endpoints, and hands out a [`ServiceRegistryClient`].

#![doc(html_root_url = "https://docs.rs/arrowhead-client/0.4.0")]

mod endpoints;
pub mod onboarding;
mod registry;
pub mod settings;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use endpoints::EndpointTable;
pub use onboarding::{
    BootstrapState, DelayUnit, OnboardedClient, OnboardingBootstrap, OnboardingConfig,
    PreparedBootstrap, RetryPolicy,
};
pub use registry::ServiceRegistryClient;
pub use settings::{Settings, SettingsError};
pub use transport::{HttpTransport, HttpTransportBuilder, Method, Transport};
pub use arrowhead_core::{ArrowheadError, Result};
