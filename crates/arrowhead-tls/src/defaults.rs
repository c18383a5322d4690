//! Explicit TLS defaults.
//!
//! Everything that would otherwise come from process-wide state (store
//! locations, algorithms, protocol) is carried in a [`TlsDefaults`] value and
//! threaded into the configurator. [`TlsDefaults::from_env`] is the one place
//! that reads the environment.

use crate::store::{KeyStoreParameters, StoreFormat, StoreParameters};

/// Default security protocol name
pub const DEFAULT_SECURITY_PROTOCOL: &str = "TLS";

/// Default key and trust manager factory algorithm
pub const DEFAULT_FACTORY_ALGORITHM: &str = "PKIX";

/// Environment variable names understood by [`TlsDefaults::from_env`]
pub mod env {
    /// Key store file
    pub const KEY_STORE_FILE: &str = "AH_KEY_STORE";
    /// Key store type
    pub const KEY_STORE_TYPE: &str = "AH_KEY_STORE_TYPE";
    /// Key store provider
    pub const KEY_STORE_PROVIDER: &str = "AH_KEY_STORE_PROVIDER";
    /// Key store password
    pub const KEY_STORE_PASSWORD: &str = "AH_KEY_STORE_PASSWORD";
    /// Password of the key inside the key store
    pub const KEY_PASSWORD: &str = "AH_KEY_PASSWORD";
    /// Trust store file
    pub const TRUST_STORE_FILE: &str = "AH_TRUST_STORE";
    /// Trust store type
    pub const TRUST_STORE_TYPE: &str = "AH_TRUST_STORE_TYPE";
    /// Trust store provider
    pub const TRUST_STORE_PROVIDER: &str = "AH_TRUST_STORE_PROVIDER";
    /// Trust store password
    pub const TRUST_STORE_PASSWORD: &str = "AH_TRUST_STORE_PASSWORD";
    /// Key manager factory algorithm
    pub const KEY_MANAGER_ALGORITHM: &str = "AH_KEY_MANAGER_ALGORITHM";
    /// Trust manager factory algorithm
    pub const TRUST_MANAGER_ALGORITHM: &str = "AH_TRUST_MANAGER_ALGORITHM";
    /// Security protocol
    pub const SECURITY_PROTOCOL: &str = "AH_SECURITY_PROTOCOL";
}

/// Defaults applied when a configurator or factory has no explicit value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsDefaults {
    /// Identity store used when the configurator is not given one
    pub key_store: KeyStoreParameters,

    /// Trust store used when the configurator is not given one
    pub trust_store: StoreParameters,

    /// Key manager factory algorithm
    pub key_algorithm: String,

    /// Trust manager factory algorithm
    pub trust_algorithm: String,

    /// Store type assumed when a store does not name one
    pub store_format: StoreFormat,

    /// Security protocol name
    pub protocol: String,
}

impl Default for TlsDefaults {
    fn default() -> Self {
        Self {
            key_store: KeyStoreParameters::default(),
            trust_store: StoreParameters::default(),
            key_algorithm: DEFAULT_FACTORY_ALGORITHM.to_string(),
            trust_algorithm: DEFAULT_FACTORY_ALGORITHM.to_string(),
            store_format: StoreFormat::default(),
            protocol: DEFAULT_SECURITY_PROTOCOL.to_string(),
        }
    }
}

impl TlsDefaults {
    /// Read defaults from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build defaults from an arbitrary variable lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut defaults = Self::default();

        let key_store = &mut defaults.key_store;
        key_store.set_provider(lookup(env::KEY_STORE_PROVIDER));
        key_store.set_store_type(lookup(env::KEY_STORE_TYPE));
        key_store.set_password(lookup(env::KEY_STORE_PASSWORD).map(Into::into));
        key_store.set_key_password(lookup(env::KEY_PASSWORD).map(Into::into));
        if let Some(file) = lookup(env::KEY_STORE_FILE) {
            key_store.set_source_file(file);
        }

        let trust_store = &mut defaults.trust_store;
        trust_store.set_provider(lookup(env::TRUST_STORE_PROVIDER));
        trust_store.set_store_type(lookup(env::TRUST_STORE_TYPE));
        trust_store.set_password(lookup(env::TRUST_STORE_PASSWORD).map(Into::into));
        if let Some(file) = lookup(env::TRUST_STORE_FILE) {
            trust_store.set_source_file(file);
        }

        if let Some(algorithm) = lookup(env::KEY_MANAGER_ALGORITHM) {
            defaults.key_algorithm = algorithm;
        }
        if let Some(algorithm) = lookup(env::TRUST_MANAGER_ALGORITHM) {
            defaults.trust_algorithm = algorithm;
        }
        if let Some(protocol) = lookup(env::SECURITY_PROTOCOL) {
            defaults.protocol = protocol;
        }

        defaults
    }
}
