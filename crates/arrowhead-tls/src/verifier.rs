//! Server certificate and hostname verification.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, Error, SignatureScheme};
use std::sync::Arc;
use tracing::{debug, warn};

/// Certificates presented by the peer during the handshake
#[derive(Debug, Clone, Copy)]
pub struct PeerSession<'a> {
    /// Leaf certificate
    pub end_entity: &'a CertificateDer<'a>,
    /// Chain presented after the leaf
    pub intermediates: &'a [CertificateDer<'a>],
}

/// Decides whether a peer may be accepted when its certificate does not
/// name the host we connected to.
///
/// Consulted only after the certificate chain itself has been validated and
/// the name check failed.
pub trait HostnameVerifier: std::fmt::Debug + Send + Sync {
    /// Return true to accept `session` for `hostname`
    fn verify(&self, hostname: &str, session: &PeerSession<'_>) -> bool;
}

/// Rejects every name mismatch
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictHostnameVerifier;

impl HostnameVerifier for StrictHostnameVerifier {
    fn verify(&self, _hostname: &str, _session: &PeerSession<'_>) -> bool {
        false
    }
}

/// Accepts every host/session pair
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHostnameVerifier;

impl NoopHostnameVerifier {
    /// Shared instance
    #[must_use]
    pub fn shared() -> Arc<dyn HostnameVerifier> {
        Arc::new(Self)
    }
}

impl HostnameVerifier for NoopHostnameVerifier {
    fn verify(&self, _hostname: &str, _session: &PeerSession<'_>) -> bool {
        true
    }
}

/// Trust manager that accepts any certificate chain.
///
/// Handshake signatures are still checked against the presented key so the
/// peer must hold the private key of the certificate it sends.
#[derive(Debug)]
pub struct TrustAllVerifier {
    provider: Arc<CryptoProvider>,
}

impl TrustAllVerifier {
    /// Create a verifier using `provider` for signature checks
    #[must_use]
    pub const fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for TrustAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        warn!(
            server = %server_name.to_str(),
            chain_len = intermediates.len() + 1,
            "accepting server certificate without validation"
        );
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Wraps a trust manager and lets a [`HostnameVerifier`] overrule name
/// mismatches. Any other validation failure is returned unchanged.
#[derive(Debug)]
pub(crate) struct HostnameOverride {
    inner: Arc<dyn ServerCertVerifier>,
    hostname_verifier: Arc<dyn HostnameVerifier>,
}

impl HostnameOverride {
    pub(crate) fn new(
        inner: Arc<dyn ServerCertVerifier>,
        hostname_verifier: Arc<dyn HostnameVerifier>,
    ) -> Self {
        Self {
            inner,
            hostname_verifier,
        }
    }
}

const fn is_name_mismatch(err: &Error) -> bool {
    matches!(
        err,
        Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
        )
    )
}

impl ServerCertVerifier for HostnameOverride {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(err) if is_name_mismatch(&err) => {
                let hostname = server_name.to_str();
                let session = PeerSession {
                    end_entity,
                    intermediates,
                };
                if self.hostname_verifier.verify(&hostname, &session) {
                    debug!(server = %hostname, "hostname mismatch accepted by verifier");
                    Ok(ServerCertVerified::assertion())
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
