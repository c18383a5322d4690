use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Core systems of an Arrowhead local cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreSystem {
    /// Service registry
    ServiceRegistry,
    /// Authorization system
    Authorization,
    /// Orchestrator
    Orchestrator,
    /// Event handler
    EventHandler,
    /// Gatekeeper (inter-cloud)
    Gatekeeper,
    /// Gateway (inter-cloud)
    Gateway,
    /// Certificate authority
    CertificateAuthority,
    /// Onboarding controller
    Onboarding,
    /// Device registry
    DeviceRegistry,
    /// System registry
    SystemRegistry,
    /// Choreographer
    Choreographer,
    /// QoS monitor
    QosMonitor,
}

impl CoreSystem {
    /// Every known core system
    pub const ALL: [Self; 12] = [
        Self::ServiceRegistry,
        Self::Authorization,
        Self::Orchestrator,
        Self::EventHandler,
        Self::Gatekeeper,
        Self::Gateway,
        Self::CertificateAuthority,
        Self::Onboarding,
        Self::DeviceRegistry,
        Self::SystemRegistry,
        Self::Choreographer,
        Self::QosMonitor,
    ];

    /// Canonical snake_case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceRegistry => "service_registry",
            Self::Authorization => "authorization",
            Self::Orchestrator => "orchestrator",
            Self::EventHandler => "event_handler",
            Self::Gatekeeper => "gatekeeper",
            Self::Gateway => "gateway",
            Self::CertificateAuthority => "certificate_authority",
            Self::Onboarding => "onboarding",
            Self::DeviceRegistry => "device_registry",
            Self::SystemRegistry => "system_registry",
            Self::Choreographer => "choreographer",
            Self::QosMonitor => "qos_monitor",
        }
    }

    /// Base path the system serves its API under
    #[must_use]
    pub const fn base_path(&self) -> &'static str {
        match self {
            Self::ServiceRegistry => "serviceregistry",
            Self::Authorization => "authorization",
            Self::Orchestrator => "orchestrator",
            Self::EventHandler => "eventhandler",
            Self::Gatekeeper => "gatekeeper",
            Self::Gateway => "gateway",
            Self::CertificateAuthority => "certificate-authority",
            Self::Onboarding => "onboarding",
            Self::DeviceRegistry => "deviceregistry",
            Self::SystemRegistry => "systemregistry",
            Self::Choreographer => "choreographer",
            Self::QosMonitor => "qos_monitor",
        }
    }

    /// Port the system listens on in a default deployment
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::ServiceRegistry => 8443,
            Self::Authorization => 8445,
            Self::Orchestrator => 8441,
            Self::EventHandler => 8455,
            Self::Gatekeeper => 8449,
            Self::Gateway => 8453,
            Self::CertificateAuthority => 8448,
            Self::Onboarding => 8435,
            Self::DeviceRegistry => 8439,
            Self::SystemRegistry => 8437,
            Self::Choreographer => 8457,
            Self::QosMonitor => 8451,
        }
    }
}

impl std::fmt::Display for CoreSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|system| system.as_str() == normalized)
            .ok_or_else(|| format!("unknown core system: {s}"))
    }
}

/// Transport protocol used to reach the core systems
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// Plain HTTP (development clouds only)
    Http,
    /// HTTP over TLS
    #[default]
    Https,
}

impl TransportProtocol {
    /// Returns true if the protocol requires transport security
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Https)
    }

    /// URL scheme for this protocol
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_system_parse() {
        assert_eq!(
            "service-registry".parse::<CoreSystem>().unwrap(),
            CoreSystem::ServiceRegistry
        );
        assert_eq!(
            "QoS Monitor".parse::<CoreSystem>().unwrap(),
            CoreSystem::QosMonitor
        );
        assert!("registry".parse::<CoreSystem>().is_err());
    }

    #[test]
    fn test_core_system_serde_matches_display() {
        for system in CoreSystem::ALL {
            let json = serde_json::to_string(&system).unwrap();
            assert_eq!(json, format!("\"{system}\""));
        }
    }

    #[test]
    fn test_protocol_security() {
        assert!(TransportProtocol::Https.is_secure());
        assert!(!TransportProtocol::Http.is_secure());
        assert_eq!(TransportProtocol::default(), TransportProtocol::Https);
    }
}
