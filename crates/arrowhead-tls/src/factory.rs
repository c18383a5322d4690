//! Key and trust manager factories.
//!
//! A factory turns a loaded store into the managers a TLS context needs:
//! an [`IdentityFactory`] proves who we are, a [`TrustFactory`] decides which
//! peers we believe. [`FactoryBuilder`] drives store loading, algorithm and
//! provider resolution, and applies the strict/lenient failure policy.

use crate::defaults::TlsDefaults;
use crate::error::{settle, CryptoInitError, InitTarget, StoreFailure, TlsResult};
use crate::secret::Password;
use crate::store::{KeyStoreParameters, LoadedStore, StoreParameters, StoredKey};
use rustls::client::danger::ServerCertVerifier;
use rustls::client::{ResolvesClientCert, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, SignatureScheme};
use std::sync::Arc;
use tracing::debug;

/// Manager factory algorithms this crate implements
pub const SUPPORTED_ALGORITHMS: &[&str] = &["PKIX", "X509"];

/// Crypto provider used when none is named
pub const DEFAULT_PROVIDER: &str = "ring";

/// Resolve an explicit or default algorithm name to its canonical form
pub fn resolve_algorithm(explicit: Option<&str>, default: &str) -> Result<String, CryptoInitError> {
    let name = explicit.unwrap_or(default);
    SUPPORTED_ALGORITHMS
        .iter()
        .find(|supported| supported.eq_ignore_ascii_case(name))
        .map(|supported| (*supported).to_string())
        .ok_or_else(|| CryptoInitError::UnsupportedAlgorithm(name.to_string()))
}

/// Resolve a crypto provider by name
pub fn resolve_provider(name: Option<&str>) -> Result<Arc<CryptoProvider>, CryptoInitError> {
    match name.unwrap_or(DEFAULT_PROVIDER) {
        n if n.eq_ignore_ascii_case(DEFAULT_PROVIDER) => {
            Ok(Arc::new(rustls::crypto::ring::default_provider()))
        }
        other => Err(CryptoInitError::UnsupportedProvider(other.to_string())),
    }
}

/// Produces the client-certificate resolvers ("key managers") of a context
#[derive(Debug, Clone)]
pub struct IdentityFactory {
    algorithm: String,
    provider: Arc<CryptoProvider>,
    certified_key: Arc<CertifiedKey>,
}

impl IdentityFactory {
    /// Initialise from a loaded store, decrypting the key with `password`
    pub fn init(
        algorithm: String,
        provider: Arc<CryptoProvider>,
        store: LoadedStore,
        password: Option<&Password>,
    ) -> Result<Self, CryptoInitError> {
        if store.certificates.is_empty() {
            return Err(CryptoInitError::KeyManagement(
                "key store holds no certificate chain".to_string(),
            ));
        }

        let key = match store.private_key {
            Some(StoredKey::Plain(key)) => key,
            Some(StoredKey::Encrypted(der)) => decrypt_key(&der, password)?,
            None => {
                return Err(CryptoInitError::UnrecoverableKey(
                    "key store holds no private key".to_string(),
                ))
            }
        };

        let signing_key = provider
            .key_provider
            .load_private_key(key)
            .map_err(|e| CryptoInitError::UnrecoverableKey(e.to_string()))?;

        Ok(Self {
            algorithm,
            provider,
            certified_key: Arc::new(CertifiedKey::new(store.certificates, signing_key)),
        })
    }

    /// Canonical algorithm name
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Provider the key was loaded with
    #[must_use]
    pub const fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Certificate chain presented to peers
    #[must_use]
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.certified_key.cert
    }

    /// Key managers for a security context
    #[must_use]
    pub fn key_managers(&self) -> Vec<Arc<dyn ResolvesClientCert>> {
        let resolver: Arc<dyn ResolvesClientCert> =
            Arc::new(StaticIdentity(Arc::clone(&self.certified_key)));
        vec![resolver]
    }
}

fn decrypt_key(
    der: &[u8],
    password: Option<&Password>,
) -> Result<PrivateKeyDer<'static>, CryptoInitError> {
    let password = password.ok_or_else(|| {
        CryptoInitError::UnrecoverableKey("encrypted private key but no password".to_string())
    })?;

    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| CryptoInitError::UnrecoverableKey(e.to_string()))?;
    let document = info
        .decrypt(password.expose())
        .map_err(|e| CryptoInitError::UnrecoverableKey(e.to_string()))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        document.as_bytes().to_vec(),
    )))
}

/// Always presents the same certified key
#[derive(Debug)]
struct StaticIdentity(Arc<CertifiedKey>);

impl ResolvesClientCert for StaticIdentity {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Produces the server-certificate verifiers ("trust managers") of a context
#[derive(Debug, Clone)]
pub struct TrustFactory {
    algorithm: String,
    provider: Arc<CryptoProvider>,
    anchors: usize,
    verifier: Arc<WebPkiServerVerifier>,
}

impl TrustFactory {
    /// Initialise from a loaded store; every certificate becomes a trust anchor
    pub fn init(
        algorithm: String,
        provider: Arc<CryptoProvider>,
        store: LoadedStore,
    ) -> Result<Self, CryptoInitError> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(store.certificates);
        if ignored > 0 {
            debug!(added, ignored, "some trust store certificates were not usable");
        }
        if added == 0 {
            return Err(CryptoInitError::KeyManagement(
                "trust store holds no usable certificates".to_string(),
            ));
        }

        let verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .map_err(|e| CryptoInitError::KeyManagement(e.to_string()))?;

        Ok(Self {
            algorithm,
            provider,
            anchors: added,
            verifier,
        })
    }

    /// Canonical algorithm name
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Provider used for signature verification
    #[must_use]
    pub const fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Number of trust anchors
    #[must_use]
    pub const fn anchor_count(&self) -> usize {
        self.anchors
    }

    /// Trust managers for a security context
    #[must_use]
    pub fn trust_managers(&self) -> Vec<Arc<dyn ServerCertVerifier>> {
        let verifier: Arc<dyn ServerCertVerifier> = self.verifier.clone();
        vec![verifier]
    }
}

/// Builds identity and trust factories from store parameters
#[derive(Debug, Clone, Copy)]
pub struct FactoryBuilder<'a> {
    defaults: &'a TlsDefaults,
}

impl<'a> FactoryBuilder<'a> {
    /// Create a builder that falls back to `defaults`
    #[must_use]
    pub const fn new(defaults: &'a TlsDefaults) -> Self {
        Self { defaults }
    }

    /// Build an identity factory.
    ///
    /// With `strict` set any failure is returned as an error; otherwise it is
    /// logged and `Ok(None)` is returned.
    pub fn build_identity(
        &self,
        params: &KeyStoreParameters,
        strict: bool,
    ) -> TlsResult<Option<IdentityFactory>> {
        let outcome = self.init_identity(params);
        settle(InitTarget::KeyStore, &params.describe_source(), outcome, strict)
    }

    /// Build a trust factory; same failure policy as [`Self::build_identity`]
    pub fn build_trust(
        &self,
        params: &StoreParameters,
        strict: bool,
    ) -> TlsResult<Option<TrustFactory>> {
        let outcome = self.init_trust(params);
        settle(InitTarget::TrustStore, &params.describe_source(), outcome, strict)
    }

    fn init_identity(&self, params: &KeyStoreParameters) -> Result<IdentityFactory, StoreFailure> {
        let store = params.load_with_default(self.defaults.store_format)?;
        let algorithm =
            resolve_algorithm(params.factory_algorithm(), &self.defaults.key_algorithm)?;
        let provider = resolve_provider(params.provider())?;
        let factory =
            IdentityFactory::init(algorithm, provider, store, params.effective_key_password())?;
        debug!(
            source = %params.describe_source(),
            algorithm = factory.algorithm(),
            chain_len = factory.certificate_chain().len(),
            "initialized key manager factory"
        );
        Ok(factory)
    }

    fn init_trust(&self, params: &StoreParameters) -> Result<TrustFactory, StoreFailure> {
        let store = params.load_with_default(self.defaults.store_format)?;
        let algorithm =
            resolve_algorithm(params.factory_algorithm(), &self.defaults.trust_algorithm)?;
        let provider = resolve_provider(params.provider())?;
        let factory = TrustFactory::init(algorithm, provider, store)?;
        debug!(
            source = %params.describe_source(),
            algorithm = factory.algorithm(),
            anchors = factory.anchor_count(),
            "initialized trust manager factory"
        );
        Ok(factory)
    }
}
