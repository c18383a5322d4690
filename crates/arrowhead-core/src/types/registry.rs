use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service as described in the service registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Service definition name (e.g. "temperature")
    pub service_definition: String,

    /// Interfaces the service is offered over (e.g. "HTTPS-SECURE-JSON")
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// Free-form metadata attached to the service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_metadata: BTreeMap<String, String>,
}

impl ServiceDefinition {
    /// Create a service definition with no interfaces or metadata
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            service_definition: name.into(),
            ..Self::default()
        }
    }

    /// Add an interface
    #[must_use]
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.service_metadata.insert(key.into(), value.into());
        self
    }
}

/// An application or core system in the local cloud
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowheadSystem {
    /// System name
    pub system_name: String,

    /// Host name or IP address
    pub address: String,

    /// Port the system listens on
    pub port: u16,

    /// Base64 public key, present for secure systems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_info: Option<String>,
}

impl ArrowheadSystem {
    /// Create a system description
    #[must_use]
    pub fn new(system_name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            system_name: system_name.into(),
            address: address.into(),
            port,
            authentication_info: None,
        }
    }
}

/// A single service registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistryEntry {
    /// The offered service
    pub provided_service: ServiceDefinition,

    /// The system offering it
    pub provider: ArrowheadSystem,

    /// Sub-path of the service on the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_uri: Option<String>,

    /// Service version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Whether the service is offered over UDP
    #[serde(default)]
    pub udp: bool,

    /// Time to live in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,

    /// Registration expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_validity: Option<DateTime<Utc>>,
}

impl ServiceRegistryEntry {
    /// Create a registration for `service` offered by `provider`
    #[must_use]
    pub fn new(provided_service: ServiceDefinition, provider: ArrowheadSystem) -> Self {
        Self {
            provided_service,
            provider,
            ..Self::default()
        }
    }

    /// Set the service URI
    #[must_use]
    pub fn service_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = Some(uri.into());
        self
    }

    /// Set the service version
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the time to live in seconds
    #[must_use]
    pub const fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Lookup request sent to the service registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistryQuery {
    /// Service to look for
    pub service: ServiceDefinition,

    /// Ask the registry to ping providers before answering
    #[serde(default)]
    pub ping_providers: bool,

    /// Match on metadata as well as name and interfaces
    #[serde(default)]
    pub metadata_search: bool,

    /// Required service version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl ServiceRegistryQuery {
    /// Query for the given service
    #[must_use]
    pub fn new(service: ServiceDefinition) -> Self {
        Self {
            service,
            ..Self::default()
        }
    }

    /// Ask the registry to ping providers
    #[must_use]
    pub const fn ping_providers(mut self, ping: bool) -> Self {
        self.ping_providers = ping;
        self
    }

    /// Enable metadata matching
    #[must_use]
    pub const fn metadata_search(mut self, search: bool) -> Self {
        self.metadata_search = search;
        self
    }
}

/// Result of a service registry lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQueryResult {
    /// Matching registrations
    #[serde(default)]
    pub service_query_data: Vec<ServiceRegistryEntry>,

    /// Number of hits before filtering
    #[serde(default)]
    pub unfiltered_hits: u32,
}

impl ServiceQueryResult {
    /// Returns true if no provider matched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service_query_data.is_empty()
    }

    /// Iterate over the matching providers
    pub fn providers(&self) -> impl Iterator<Item = &ArrowheadSystem> {
        self.service_query_data.iter().map(|entry| &entry.provider)
    }
}
