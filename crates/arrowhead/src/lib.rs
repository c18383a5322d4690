//! Secure-bootstrap client for Arrowhead local clouds.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use arrowhead::{HttpTransport, OnboardingBootstrap, OnboardingConfig, TransportProtocol};
//! use arrowhead::tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> arrowhead::Result<()> {
//!     let config = OnboardingConfig::new("thermometer-7")
//!         .with_onboarding_address("onboarding.local")
//!         .with_retries(5);
//!     let transport = Arc::new(HttpTransport::new(TransportProtocol::Https)?);
//!
//!     let bootstrap = OnboardingBootstrap::new(config, transport).prepare().await?;
//!     let client = bootstrap.run(&CancellationToken::new()).await?;
//!
//!     let registry = client.service_registry()?;
//!     println!("Service registry at {}", registry.base());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - [`arrowhead_core`] - DTOs, core system identifiers and errors
//! - [`tls`] - key/trust stores, factories and security contexts
//! - [`arrowhead_client`] - transport, onboarding, endpoint table, service registry

#![doc(html_root_url = "https://docs.rs/arrowhead/0.4.0")]

// Re-export core types
pub use arrowhead_core::*;

// Re-export client
pub use arrowhead_client::{
    onboarding, settings, transport, BootstrapState, DelayUnit, EndpointTable, HttpTransport,
    HttpTransportBuilder, Method, OnboardedClient, OnboardingBootstrap, OnboardingConfig,
    PreparedBootstrap, RetryPolicy, ServiceRegistryClient, Settings, SettingsError, Transport,
};

// TLS plumbing lives under its own path
pub use arrowhead_tls as tls;

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;
pub use tokio_util;
