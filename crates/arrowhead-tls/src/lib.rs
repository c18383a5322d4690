//! Key/trust store loading and TLS context assembly.
//!
//! [`TlsContextConfigurator`] collects store locations and credentials,
//! [`FactoryBuilder`] turns them into key and trust manager factories, and
//! [`SecurityContext`] bundles the result into something a transport can
//! install as a rustls client configuration.
//!
//! Every builder takes a `strict` flag: strict callers get a
//! [`StoreInitError`] on failure, lenient callers get `None` and a warning.

#![doc(html_root_url = "https://docs.rs/arrowhead-tls/0.4.0")]

mod configurator;
mod context;
pub mod defaults;
mod error;
mod factory;
mod secret;
mod store;
mod verifier;

#[cfg(test)]
mod test_support;

pub use configurator::TlsContextConfigurator;
pub use context::{SecurityContext, TlsProtocol};
pub use defaults::TlsDefaults;
pub use error::{
    CryptoInitError, FailureKind, InitTarget, StoreFailure, StoreInitError, StoreLoadError,
    TlsResult,
};
pub use factory::{
    resolve_algorithm, resolve_provider, FactoryBuilder, IdentityFactory, TrustFactory,
    DEFAULT_PROVIDER, SUPPORTED_ALGORITHMS,
};
pub use secret::Password;
pub use store::{KeyStoreParameters, LoadedStore, StoreFormat, StoreParameters, StoredKey};
pub use verifier::{
    HostnameVerifier, NoopHostnameVerifier, PeerSession, StrictHostnameVerifier,
    TrustAllVerifier,
};

/// Re-exported so callers can name rustls types without a direct dependency
pub use rustls;
