//! Mutable builder that assembles security contexts from store parameters.

use crate::context::{SecurityContext, TlsProtocol};
use crate::defaults::TlsDefaults;
use crate::error::{settle, InitTarget, StoreFailure, TlsResult};
use crate::factory::{FactoryBuilder, IdentityFactory, TrustFactory};
use crate::secret::Password;
use crate::store::{KeyStoreParameters, StoreParameters};
use std::path::PathBuf;
use tracing::debug;

/// Collects key store, trust store and protocol options and turns them into
/// a [`SecurityContext`].
///
/// Unset options fall back to the [`TlsDefaults`] the configurator was built
/// with.
#[derive(Debug, Clone)]
pub struct TlsContextConfigurator {
    key_store: KeyStoreParameters,
    trust_store: StoreParameters,
    protocol: String,
    defaults: TlsDefaults,
}

impl Default for TlsContextConfigurator {
    fn default() -> Self {
        Self::empty()
    }
}

impl TlsContextConfigurator {
    /// Start from `defaults`, including its default stores
    #[must_use]
    pub fn new(defaults: TlsDefaults) -> Self {
        Self {
            key_store: defaults.key_store.clone(),
            trust_store: defaults.trust_store.clone(),
            protocol: defaults.protocol.clone(),
            defaults,
        }
    }

    /// Configurator with no stores and built-in defaults
    #[must_use]
    pub fn empty() -> Self {
        Self::new(TlsDefaults::default())
    }

    /// Configurator populated from the `AH_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(TlsDefaults::from_env())
    }

    /// Identity store parameters
    #[must_use]
    pub const fn key_store(&self) -> &KeyStoreParameters {
        &self.key_store
    }

    /// Mutable identity store parameters
    pub fn key_store_mut(&mut self) -> &mut KeyStoreParameters {
        &mut self.key_store
    }

    /// Trust store parameters
    #[must_use]
    pub const fn trust_store(&self) -> &StoreParameters {
        &self.trust_store
    }

    /// Mutable trust store parameters
    pub fn trust_store_mut(&mut self) -> &mut StoreParameters {
        &mut self.trust_store
    }

    /// Configured protocol name
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Defaults in effect
    #[must_use]
    pub const fn defaults(&self) -> &TlsDefaults {
        &self.defaults
    }

    pub fn set_key_store_provider(&mut self, provider: impl Into<String>) -> &mut Self {
        self.key_store.set_provider(Some(provider.into()));
        self
    }

    pub fn set_key_store_type(&mut self, store_type: impl Into<String>) -> &mut Self {
        self.key_store.set_store_type(Some(store_type.into()));
        self
    }

    pub fn set_key_store_password(&mut self, password: impl Into<Password>) -> &mut Self {
        self.key_store.set_password(Some(password.into()));
        self
    }

    /// Password of the private key; the key store password is used if unset
    pub fn set_key_password(&mut self, password: impl Into<Password>) -> &mut Self {
        self.key_store.set_key_password(Some(password.into()));
        self
    }

    /// Read the key store from a file, replacing any key store bytes
    pub fn set_key_store_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.key_store.set_source_file(path);
        self
    }

    /// Read the key store from memory, replacing any key store file
    pub fn set_key_store_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.key_store.set_source_bytes(bytes);
        self
    }

    pub fn set_key_manager_algorithm(&mut self, algorithm: impl Into<String>) -> &mut Self {
        self.key_store.set_factory_algorithm(Some(algorithm.into()));
        self
    }

    pub fn set_trust_store_provider(&mut self, provider: impl Into<String>) -> &mut Self {
        self.trust_store.set_provider(Some(provider.into()));
        self
    }

    pub fn set_trust_store_type(&mut self, store_type: impl Into<String>) -> &mut Self {
        self.trust_store.set_store_type(Some(store_type.into()));
        self
    }

    pub fn set_trust_store_password(&mut self, password: impl Into<Password>) -> &mut Self {
        self.trust_store.set_password(Some(password.into()));
        self
    }

    /// Read the trust store from a file, replacing any trust store bytes
    pub fn set_trust_store_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.trust_store.set_source_file(path);
        self
    }

    /// Read the trust store from memory, replacing any trust store file
    pub fn set_trust_store_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.trust_store.set_source_bytes(bytes);
        self
    }

    pub fn set_trust_manager_algorithm(&mut self, algorithm: impl Into<String>) -> &mut Self {
        self.trust_store.set_factory_algorithm(Some(algorithm.into()));
        self
    }

    /// Security protocol: `TLS`, `TLSv1.2` or `TLSv1.3`
    pub fn set_protocol(&mut self, protocol: impl Into<String>) -> &mut Self {
        self.protocol = protocol.into();
        self
    }

    /// Build the key manager factory from the key store
    pub fn create_identity_factory(&self, strict: bool) -> TlsResult<Option<IdentityFactory>> {
        FactoryBuilder::new(&self.defaults).build_identity(&self.key_store, strict)
    }

    /// Build the trust manager factory from the trust store
    pub fn create_trust_factory(&self, strict: bool) -> TlsResult<Option<TrustFactory>> {
        FactoryBuilder::new(&self.defaults).build_trust(&self.trust_store, strict)
    }

    /// Create a context from the given factories, building any that are
    /// missing from the configured stores.
    ///
    /// Stores without a file or bytes contribute no managers.
    pub fn create_context(
        &self,
        strict: bool,
        identity: Option<IdentityFactory>,
        trust: Option<TrustFactory>,
    ) -> TlsResult<Option<SecurityContext>> {
        let identity = match identity {
            Some(factory) => Some(factory),
            None => self.configured_identity(strict)?,
        };
        let trust = match trust {
            Some(factory) => Some(factory),
            None => self.configured_trust(strict)?,
        };
        self.assemble(strict, identity.as_ref(), trust.as_ref())
    }

    /// Context with both a client identity and a trust store
    pub fn create_mutual_context(&self, strict: bool) -> TlsResult<Option<SecurityContext>> {
        self.create_context(strict, None, None)
    }

    /// Context that validates the server but presents no client certificate
    pub fn create_trust_only_context(&self, strict: bool) -> TlsResult<Option<SecurityContext>> {
        let trust = self.configured_trust(strict)?;
        self.assemble(strict, None, trust.as_ref())
    }

    /// Context that accepts every server certificate.
    ///
    /// The configured identity, if any, is still presented. Pair it with
    /// [`NoopHostnameVerifier`](crate::NoopHostnameVerifier); only meant for
    /// bootstrapping against a server whose root is not yet known.
    pub fn create_trust_all_context(&self, strict: bool) -> TlsResult<Option<SecurityContext>> {
        let identity = self.configured_identity(strict)?;
        let outcome = self
            .resolve_protocol()
            .and_then(|protocol| {
                SecurityContext::init_trust_all(protocol, identity.as_ref()).map_err(Into::into)
            });
        settle(InitTarget::Context, &self.protocol, outcome, strict)
    }

    fn configured_identity(&self, strict: bool) -> TlsResult<Option<IdentityFactory>> {
        if !self.key_store.has_source() {
            debug!("no key store configured, context will carry no client identity");
            return Ok(None);
        }
        self.create_identity_factory(strict)
    }

    fn configured_trust(&self, strict: bool) -> TlsResult<Option<TrustFactory>> {
        if !self.trust_store.has_source() {
            debug!("no trust store configured, context will use platform roots");
            return Ok(None);
        }
        self.create_trust_factory(strict)
    }

    fn resolve_protocol(&self) -> Result<TlsProtocol, StoreFailure> {
        self.protocol.parse::<TlsProtocol>().map_err(StoreFailure::from)
    }

    fn assemble(
        &self,
        strict: bool,
        identity: Option<&IdentityFactory>,
        trust: Option<&TrustFactory>,
    ) -> TlsResult<Option<SecurityContext>> {
        let outcome = self.resolve_protocol().and_then(|protocol| {
            SecurityContext::init(protocol, identity, trust).map_err(Into::into)
        });
        settle(InitTarget::Context, &self.protocol, outcome, strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, StoreLoadError};
    use crate::test_support::issue_chain;

    fn configured() -> TlsContextConfigurator {
        let chain = issue_chain("device.local");
        let mut configurator = TlsContextConfigurator::empty();
        configurator
            .set_key_store_bytes(chain.encrypted_identity_pem("changeit"))
            .set_key_store_password("changeit")
            .set_trust_store_bytes(chain.ca_pem.clone());
        configurator
    }

    #[test]
    fn test_mutual_context() {
        let context = configured().create_mutual_context(true).unwrap().unwrap();
        assert!(context.has_identity());
        assert_eq!(context.trust_managers().len(), 1);
        assert_eq!(context.protocol(), TlsProtocol::Any);
    }

    #[test]
    fn test_trust_only_context_has_no_identity() {
        let context = configured()
            .create_trust_only_context(true)
            .unwrap()
            .unwrap();
        assert!(!context.has_identity());
        assert_eq!(context.trust_managers().len(), 1);
    }

    #[test]
    fn test_trust_all_context_keeps_identity() {
        let context = configured()
            .create_trust_all_context(true)
            .unwrap()
            .unwrap();
        assert!(context.is_insecure());
        assert!(context.has_identity());
    }

    #[test]
    fn test_unconfigured_stores_give_empty_context() {
        let context = TlsContextConfigurator::empty()
            .create_mutual_context(true)
            .unwrap()
            .unwrap();
        assert!(!context.has_identity());
        assert!(context.trust_managers().is_empty());
    }

    #[test]
    fn test_explicit_factory_reports_missing_store() {
        let configurator = TlsContextConfigurator::empty();
        let err = configurator.create_trust_factory(true).unwrap_err();
        assert!(matches!(err.load_error(), Some(StoreLoadError::NotConfigured)));
        assert!(configurator.create_trust_factory(false).unwrap().is_none());
    }

    #[test]
    fn test_missing_trust_file() {
        let mut configurator = TlsContextConfigurator::empty();
        configurator.set_trust_store_file("/srv/arrowhead/missing-truststore.pem");

        let err = configurator.create_mutual_context(true).unwrap_err();
        assert_eq!(err.target, InitTarget::TrustStore);
        assert!(matches!(
            err.load_error(),
            Some(StoreLoadError::FileNotFound { .. })
        ));

        // lenient mode drops the trust factory and still builds a context
        let context = configurator.create_mutual_context(false).unwrap().unwrap();
        assert!(context.trust_managers().is_empty());
    }

    #[test]
    fn test_unknown_protocol() {
        let mut configurator = TlsContextConfigurator::empty();
        configurator.set_protocol("SSLv3");

        let err = configurator.create_mutual_context(true).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedProtocol);
        assert_eq!(err.target, InitTarget::Context);
        assert!(configurator.create_mutual_context(false).unwrap().is_none());
    }

    #[test]
    fn test_explicit_factories_are_used() {
        let source = configured();
        let trust = source.create_trust_factory(true).unwrap();

        // the configurator's own trust store is broken, the explicit factory wins
        let mut configurator = TlsContextConfigurator::empty();
        configurator.set_trust_store_file("/does/not/exist.pem");
        let context = configurator
            .create_context(true, None, trust)
            .unwrap()
            .unwrap();
        assert_eq!(context.trust_managers().len(), 1);
    }

    #[test]
    fn test_defaults_seed_stores() {
        let mut defaults = TlsDefaults::default();
        defaults.trust_store.set_source_file("/etc/arrowhead/truststore.pem");
        defaults.protocol = "TLSv1.2".to_string();

        let configurator = TlsContextConfigurator::new(defaults);
        assert!(configurator.trust_store().has_source());
        assert_eq!(configurator.protocol(), "TLSv1.2");
    }
}
