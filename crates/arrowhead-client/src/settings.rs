//! Settings file.
//!
//! A TOML document describing the TLS stores, the onboarding controller and
//! optional endpoint overrides:
//!
//! ```toml
//! [tls]
//! protocol = "TLSv1.3"
//!
//! [tls.key_store]
//! file = "~/.config/arrowhead/device.pem"
//! type = "PEM"
//! password = "changeit"
//!
//! [tls.trust_store]
//! file = "~/.config/arrowhead/cloud.pem"
//!
//! [onboarding]
//! address = "onboarding.local"
//! common_name = "thermometer-7"
//! retries = "unbounded"
//! delay = 10
//! delay_unit = "seconds"
//!
//! [endpoints]
//! service_registry = "https://sr.local:8443/serviceregistry"
//! ```

use crate::endpoints::EndpointTable;
use crate::onboarding::{DelayUnit, OnboardingConfig, RetryPolicy};
use arrowhead_core::{ArrowheadError, CoreSystem, TransportProtocol};
use arrowhead_tls::{TlsContextConfigurator, TlsDefaults};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Settings file could not be read or used
#[derive(Error, Debug)]
pub enum SettingsError {
    /// File exists but could not be read or written
    #[error("settings file {}: {source}", path.display())]
    Io {
        /// Settings file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML or does not match the schema
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be rendered as TOML
    #[error("failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),

    /// An `[endpoints]` entry names an unknown system or carries a bad URL
    #[error("invalid endpoint {name}: {reason}")]
    InvalidEndpoint {
        /// Key in the `[endpoints]` table
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Onboarding needs a device common name
    #[error("no device common name configured")]
    MissingCommonName,
}

impl From<SettingsError> for ArrowheadError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Location and credentials of one key or trust store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// Store file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Store type: `PEM`, or `DER` for a single trusted certificate
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,

    /// Crypto provider name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Store password
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Private key password; key stores only
    #[serde(skip_serializing)]
    pub key_password: Option<String>,

    /// Manager factory algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

impl StoreSettings {
    /// Returns true if a store file is named
    #[must_use]
    pub const fn has_file(&self) -> bool {
        self.file.is_some()
    }

    /// Rewrite the store path, e.g. to expand `~`
    pub fn map_file(&mut self, f: impl FnOnce(&Path) -> PathBuf) {
        if let Some(file) = self.file.take() {
            self.file = Some(f(&file));
        }
    }
}

/// `[tls]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSettings {
    /// Security protocol: `TLS`, `TLSv1.2` or `TLSv1.3`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Identity store
    pub key_store: StoreSettings,

    /// Trust store
    pub trust_store: StoreSettings,
}

impl TlsSettings {
    /// Copy every value present here into `configurator`
    pub fn apply_to(&self, configurator: &mut TlsContextConfigurator) {
        let key = &self.key_store;
        if let Some(file) = &key.file {
            configurator.set_key_store_file(file);
        }
        if let Some(store_type) = &key.store_type {
            configurator.set_key_store_type(store_type);
        }
        if let Some(provider) = &key.provider {
            configurator.set_key_store_provider(provider);
        }
        if let Some(password) = &key.password {
            configurator.set_key_store_password(password.as_str());
        }
        if let Some(password) = &key.key_password {
            configurator.set_key_password(password.as_str());
        }
        if let Some(algorithm) = &key.algorithm {
            configurator.set_key_manager_algorithm(algorithm);
        }

        let trust = &self.trust_store;
        if let Some(file) = &trust.file {
            configurator.set_trust_store_file(file);
        }
        if let Some(store_type) = &trust.store_type {
            configurator.set_trust_store_type(store_type);
        }
        if let Some(provider) = &trust.provider {
            configurator.set_trust_store_provider(provider);
        }
        if let Some(password) = &trust.password {
            configurator.set_trust_store_password(password.as_str());
        }
        if let Some(algorithm) = &trust.algorithm {
            configurator.set_trust_manager_algorithm(algorithm);
        }

        if let Some(protocol) = &self.protocol {
            configurator.set_protocol(protocol);
        }
    }

    /// Configurator seeded with `defaults` and overridden by these settings
    #[must_use]
    pub fn configurator(&self, defaults: TlsDefaults) -> TlsContextConfigurator {
        let mut configurator = TlsContextConfigurator::new(defaults);
        self.apply_to(&mut configurator);
        configurator
    }
}

/// Number of onboarding attempts: a count or `"unbounded"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retries {
    /// At most this many attempts
    Count(u32),
    /// Until success, a terminal error or cancellation
    Unbounded,
}

impl Default for Retries {
    fn default() -> Self {
        Self::Count(crate::onboarding::DEFAULT_MAX_ATTEMPTS)
    }
}

impl std::fmt::Display for Retries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Retries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_u32(*n),
            Self::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for Retries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RetriesVisitor;

        impl serde::de::Visitor<'_> for RetriesVisitor {
            type Value = Retries;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative attempt count or \"unbounded\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Retries, E> {
                u32::try_from(v)
                    .map(Retries::Count)
                    .map_err(|_| E::custom(format!("retry count {v} is too large")))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Retries, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("retry count {v} is negative")))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Retries, E> {
                if v.eq_ignore_ascii_case("unbounded") {
                    Ok(Retries::Unbounded)
                } else {
                    Err(E::invalid_value(serde::de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(RetriesVisitor)
    }
}

fn default_address() -> String {
    crate::onboarding::DEFAULT_ONBOARDING_HOST.to_string()
}

const fn default_port() -> u16 {
    8435
}

const fn default_delay() -> u64 {
    5
}

const fn default_true() -> bool {
    true
}

/// `[onboarding]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnboardingSettings {
    /// Onboarding controller host
    #[serde(default = "default_address")]
    pub address: String,

    /// Onboarding controller port
    #[serde(default = "default_port")]
    pub port: u16,

    /// `http` or `https`
    #[serde(default)]
    pub scheme: TransportProtocol,

    /// Common name requested for this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Maximum attempts
    #[serde(default)]
    pub retries: Retries,

    /// Delay between attempts, in `delay_unit`
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Unit of `delay`
    #[serde(default)]
    pub delay_unit: DelayUnit,

    /// Fail on TLS material errors instead of continuing without them
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Outer switch that permits `insecure`
    #[serde(default)]
    pub allow_insecure_bootstrap: bool,

    /// Onboard without validating the controller's certificate
    #[serde(default)]
    pub insecure: bool,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            scheme: TransportProtocol::default(),
            common_name: None,
            retries: Retries::default(),
            delay: default_delay(),
            delay_unit: DelayUnit::default(),
            strict: true,
            allow_insecure_bootstrap: false,
            insecure: false,
        }
    }
}

impl OnboardingSettings {
    /// Retry policy described by `retries`, `delay` and `delay_unit`
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = self.delay_unit.duration(self.delay);
        match self.retries {
            Retries::Count(n) => RetryPolicy::new(n, delay),
            Retries::Unbounded => RetryPolicy::unbounded(delay),
        }
    }
}

/// Contents of the settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `[tls]`
    pub tls: TlsSettings,

    /// `[onboarding]`
    pub onboarding: OnboardingSettings,

    /// `[endpoints]`: core system name to base URL
    pub endpoints: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&content)?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML; passwords are left out
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parsed `[endpoints]` table
    pub fn endpoint_overrides(&self) -> Result<Vec<(CoreSystem, Url)>, SettingsError> {
        self.endpoints
            .iter()
            .map(|(name, uri)| {
                let invalid = |reason: String| SettingsError::InvalidEndpoint {
                    name: name.clone(),
                    reason,
                };
                let system = name.parse::<CoreSystem>().map_err(invalid)?;
                let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
                Ok((system, url))
            })
            .collect()
    }

    /// Add the `[endpoints]` overrides to `table`
    pub fn apply_endpoints(&self, table: &EndpointTable) -> Result<(), SettingsError> {
        for (system, url) in self.endpoint_overrides()? {
            table.add(system, url);
        }
        Ok(())
    }

    /// Onboarding configuration described by these settings
    pub fn onboarding_config(&self, defaults: TlsDefaults) -> Result<OnboardingConfig, SettingsError> {
        let onboarding = &self.onboarding;
        let common_name = onboarding
            .common_name
            .clone()
            .filter(|cn| !cn.trim().is_empty())
            .ok_or(SettingsError::MissingCommonName)?;

        let config = OnboardingConfig::new(common_name)
            .with_onboarding_address(onboarding.address.clone())
            .with_port(onboarding.port)
            .with_retry_policy(onboarding.retry_policy())
            .with_configurator(self.tls.configurator(defaults.clone()))
            .with_tls_defaults(defaults)
            .with_strict(onboarding.strict)
            .with_allow_insecure_bootstrap(onboarding.allow_insecure_bootstrap);

        Ok(if onboarding.insecure {
            config.with_insecure_ssl_context()
        } else {
            config
        })
    }
}
