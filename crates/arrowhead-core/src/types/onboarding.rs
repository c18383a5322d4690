use super::CoreSystem;
use serde::{Deserialize, Serialize};
use url::Url;

/// Request sent to the onboarding controller by an unprovisioned device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    /// Certificate the device asks to be issued
    pub creation_request: CertificateCreationRequest,
}

impl OnboardingRequest {
    /// Ask for a certificate for `common_name`, letting the authority
    /// generate the key pair
    #[must_use]
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            creation_request: CertificateCreationRequest {
                common_name: common_name.into(),
                key_pair: None,
            },
        }
    }

    /// Supply our own key pair instead of letting the authority generate one
    #[must_use]
    pub fn with_key_pair(mut self, key_pair: KeyPairPem) -> Self {
        self.creation_request.key_pair = Some(key_pair);
        self
    }
}

/// Certificate creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateCreationRequest {
    /// Common name of the requested certificate
    pub common_name: String,

    /// Key pair to certify, if the device generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<KeyPairPem>,
}

/// PEM encoded key pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairPem {
    /// Public key (PEM)
    pub public_key: String,

    /// Private key (PEM), absent when the authority keeps it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Location of a core system service, as returned by the onboarding controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    /// Which core system this is
    pub system: CoreSystem,

    /// Base URI of the system
    pub uri: Url,
}

/// Certificate issued during onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    /// Issued certificate (PEM)
    pub certificate: String,

    /// Key pair the certificate was issued for
    pub key_pair: KeyPairPem,
}

/// Answer of the onboarding controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingResponse {
    /// Device registry endpoint
    pub device_registry: ServiceEndpoint,

    /// System registry endpoint
    pub system_registry: ServiceEndpoint,

    /// Service registry endpoint
    pub service_registry: ServiceEndpoint,

    /// Orchestrator endpoint
    pub orchestration_service: ServiceEndpoint,

    /// Operational certificate for this device
    pub onboarding_certificate: IssuedCertificate,

    /// Intermediate (cloud) certificate (PEM)
    pub intermediate_certificate: String,

    /// Root certificate (PEM)
    pub root_certificate: String,
}

impl OnboardingResponse {
    /// All endpoints handed out by the controller
    #[must_use]
    pub fn endpoints(&self) -> [&ServiceEndpoint; 4] {
        [
            &self.device_registry,
            &self.system_registry,
            &self.service_registry,
            &self.orchestration_service,
        ]
    }

    /// Trust chain to validate the cloud with (intermediate followed by root)
    #[must_use]
    pub fn trust_chain_pem(&self) -> String {
        let mut chain = self.intermediate_certificate.trim_end().to_string();
        chain.push('\n');
        chain.push_str(self.root_certificate.trim_end());
        chain.push('\n');
        chain
    }
}
