//! Security context: the assembled key and trust managers for one protocol.

use crate::error::CryptoInitError;
use crate::factory::{resolve_provider, IdentityFactory, TrustFactory};
use crate::verifier::{HostnameOverride, HostnameVerifier, TrustAllVerifier};
use rustls::client::danger::ServerCertVerifier;
use rustls::client::{ResolvesClientCert, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Security protocol a context negotiates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TlsProtocol {
    /// Any supported TLS version
    #[default]
    Any,
    /// TLS 1.2 only
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

impl TlsProtocol {
    /// Protocol name as accepted by [`FromStr`]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Any => "TLS",
            Self::Tls12 => "TLSv1.2",
            Self::Tls13 => "TLSv1.3",
        }
    }

    /// rustls protocol versions enabled for this protocol
    #[must_use]
    pub fn versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            Self::Any => rustls::ALL_VERSIONS,
            Self::Tls12 => TLS12_ONLY,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

impl FromStr for TlsProtocol {
    type Err = CryptoInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Any, Self::Tls12, Self::Tls13]
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CryptoInitError::UnsupportedProtocol(s.to_string()))
    }
}

impl std::fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Key managers, trust managers and protocol for TLS connections.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    protocol: TlsProtocol,
    provider: Arc<CryptoProvider>,
    key_managers: Vec<Arc<dyn ResolvesClientCert>>,
    trust_managers: Vec<Arc<dyn ServerCertVerifier>>,
    insecure: bool,
}

impl SecurityContext {
    /// Initialise a context from optional factories.
    ///
    /// A missing factory leaves the corresponding manager list empty.
    pub fn init(
        protocol: TlsProtocol,
        identity: Option<&IdentityFactory>,
        trust: Option<&TrustFactory>,
    ) -> Result<Self, CryptoInitError> {
        let provider = match (identity, trust) {
            (Some(f), _) => Arc::clone(f.provider()),
            (None, Some(f)) => Arc::clone(f.provider()),
            (None, None) => resolve_provider(None)?,
        };

        let context = Self {
            protocol,
            provider,
            key_managers: identity.map(IdentityFactory::key_managers).unwrap_or_default(),
            trust_managers: trust.map(TrustFactory::trust_managers).unwrap_or_default(),
            insecure: false,
        };
        context.check_protocol()?;

        debug!(
            protocol = %protocol,
            key_managers = context.key_managers.len(),
            trust_managers = context.trust_managers.len(),
            "initialized security context"
        );
        Ok(context)
    }

    /// Context whose single trust manager accepts every server chain
    pub(crate) fn init_trust_all(
        protocol: TlsProtocol,
        identity: Option<&IdentityFactory>,
    ) -> Result<Self, CryptoInitError> {
        let provider = match identity {
            Some(f) => Arc::clone(f.provider()),
            None => resolve_provider(None)?,
        };
        let trust_all: Arc<dyn ServerCertVerifier> =
            Arc::new(TrustAllVerifier::new(Arc::clone(&provider)));

        let context = Self {
            protocol,
            key_managers: identity.map(IdentityFactory::key_managers).unwrap_or_default(),
            trust_managers: vec![trust_all],
            provider,
            insecure: true,
        };
        context.check_protocol()?;

        warn!(protocol = %protocol, "created trust-all security context");
        Ok(context)
    }

    fn check_protocol(&self) -> Result<(), CryptoInitError> {
        ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(self.protocol.versions())
            .map(|_| ())
            .map_err(|e| CryptoInitError::UnsupportedProtocol(format!("{}: {e}", self.protocol)))
    }

    /// Negotiated protocol
    #[must_use]
    pub const fn protocol(&self) -> TlsProtocol {
        self.protocol
    }

    /// Crypto provider
    #[must_use]
    pub const fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Client certificate resolvers; empty when no identity is configured
    #[must_use]
    pub fn key_managers(&self) -> &[Arc<dyn ResolvesClientCert>] {
        &self.key_managers
    }

    /// Server certificate verifiers; empty means the bundled web PKI roots
    #[must_use]
    pub fn trust_managers(&self) -> &[Arc<dyn ServerCertVerifier>] {
        &self.trust_managers
    }

    /// Returns true if a client certificate will be presented
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.key_managers.is_empty()
    }

    /// Returns true if server certificates are not validated
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Build a rustls client configuration.
    ///
    /// `hostname_verifier` is consulted when the server certificate is
    /// otherwise valid but does not name the host being connected to.
    pub fn client_config(
        &self,
        hostname_verifier: Arc<dyn HostnameVerifier>,
    ) -> Result<ClientConfig, CryptoInitError> {
        if self.insecure {
            warn!("building client configuration that skips server validation");
        }

        let inner = match self.trust_managers.first() {
            Some(verifier) => Arc::clone(verifier),
            None => self.platform_verifier()?,
        };
        let verifier: Arc<dyn ServerCertVerifier> =
            Arc::new(HostnameOverride::new(inner, hostname_verifier));

        let builder = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(self.protocol.versions())
            .map_err(|e| CryptoInitError::UnsupportedProtocol(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        Ok(match self.key_managers.first() {
            Some(resolver) => builder.with_client_cert_resolver(Arc::clone(resolver)),
            None => builder.with_no_client_auth(),
        })
    }

    fn platform_verifier(&self) -> Result<Arc<dyn ServerCertVerifier>, CryptoInitError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let verifier =
            WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&self.provider))
                .build()
                .map_err(|e| CryptoInitError::KeyManagement(e.to_string()))?;
        Ok(verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::TlsDefaults;
    use crate::factory::FactoryBuilder;
    use crate::store::{KeyStoreParameters, StoreParameters};
    use crate::test_support::issue_chain;
    use crate::verifier::StrictHostnameVerifier;

    #[test]
    fn test_protocol_names() {
        assert_eq!("TLS".parse::<TlsProtocol>().unwrap(), TlsProtocol::Any);
        assert_eq!("tlsv1.2".parse::<TlsProtocol>().unwrap(), TlsProtocol::Tls12);
        assert_eq!("TLSv1.3".parse::<TlsProtocol>().unwrap(), TlsProtocol::Tls13);
        assert!(matches!(
            "SSLv3".parse::<TlsProtocol>(),
            Err(CryptoInitError::UnsupportedProtocol(_))
        ));
        assert_eq!(TlsProtocol::Tls12.versions().len(), 1);
    }

    #[test]
    fn test_empty_context_uses_platform_roots() {
        let context = SecurityContext::init(TlsProtocol::Any, None, None).unwrap();
        assert!(context.key_managers().is_empty());
        assert!(context.trust_managers().is_empty());
        assert!(!context.is_insecure());

        let config = context
            .client_config(Arc::new(StrictHostnameVerifier))
            .unwrap();
        assert!(!config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn test_mutual_context() {
        let chain = issue_chain("device.local");
        let defaults = TlsDefaults::default();
        let builder = FactoryBuilder::new(&defaults);

        let identity = builder
            .build_identity(
                &KeyStoreParameters::new()
                    .with_store(|s| s.with_source_bytes(chain.identity_pem().into_bytes())),
                true,
            )
            .unwrap();
        let trust = builder
            .build_trust(
                &StoreParameters::new().with_source_bytes(chain.ca_pem.clone().into_bytes()),
                true,
            )
            .unwrap();

        let context =
            SecurityContext::init(TlsProtocol::Tls13, identity.as_ref(), trust.as_ref()).unwrap();
        assert!(context.has_identity());
        assert_eq!(context.trust_managers().len(), 1);

        let config = context
            .client_config(Arc::new(StrictHostnameVerifier))
            .unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn test_trust_all_context_is_marked() {
        let context = SecurityContext::init_trust_all(TlsProtocol::Any, None).unwrap();
        assert!(context.is_insecure());
        assert_eq!(context.trust_managers().len(), 1);
        assert!(context.key_managers().is_empty());
    }
}
