//! Core types and errors for the Arrowhead secure-bootstrap client.
//!
//! This crate provides the foundational types shared by the client crates:
//!
//! - **Types**: service registry and onboarding DTOs, core system identifiers
//! - **Errors**: [`ArrowheadError`] and the transport-level [`TransportError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use arrowhead_core::{ServiceDefinition, ServiceRegistryQuery};
//!
//! let query = ServiceRegistryQuery::new(
//!     ServiceDefinition::new("temperature").interface("HTTPS-SECURE-JSON"),
//! )
//! .ping_providers(true);
//! ```

#![doc(html_root_url = "https://docs.rs/arrowhead-core/0.4.0")]

mod error;
pub mod types;

pub use error::{ArrowheadError, Result, TransportError};
pub use types::*;
