//! Key and trust store parameters.
//!
//! A store is a bundle of certificates (and, for identity stores, a private
//! key) read from a file or from raw bytes. [`StoreParameters`] describes where
//! the store lives and how to interpret it; [`StoreParameters::load`] turns
//! that description into a [`LoadedStore`].

use crate::error::StoreLoadError;
use crate::secret::Password;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

/// On-disk encoding of a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StoreFormat {
    /// PEM bundle of certificates and an optional private key
    #[default]
    Pem,
    /// A single DER encoded certificate (trust stores only)
    Der,
}

impl StoreFormat {
    /// Canonical type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pem => "PEM",
            Self::Der => "DER",
        }
    }
}

impl FromStr for StoreFormat {
    type Err = StoreLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PEM" => Ok(Self::Pem),
            "DER" | "CRT" | "CER" => Ok(Self::Der),
            _ => Err(StoreLoadError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, PartialEq, Eq)]
enum StoreSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl std::fmt::Debug for StoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// Location, type and credentials of one key or trust store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParameters {
    provider: Option<String>,
    store_type: Option<String>,
    password: Option<Password>,
    source: Option<StoreSource>,
    factory_algorithm: Option<String>,
}

impl StoreParameters {
    /// Empty parameters: no source, all defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Crypto provider name, if overridden
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Store type, if overridden
    #[must_use]
    pub fn store_type(&self) -> Option<&str> {
        self.store_type.as_deref()
    }

    /// Store password
    #[must_use]
    pub const fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Store file, if the store is file-backed
    #[must_use]
    pub fn source_file(&self) -> Option<&Path> {
        match &self.source {
            Some(StoreSource::File(path)) => Some(path),
            _ => None,
        }
    }

    /// Store bytes, if the store is held in memory
    #[must_use]
    pub fn source_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            Some(StoreSource::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Returns true if a file or bytes are configured
    #[must_use]
    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Manager factory algorithm, if overridden
    #[must_use]
    pub fn factory_algorithm(&self) -> Option<&str> {
        self.factory_algorithm.as_deref()
    }

    /// Set the crypto provider name
    pub fn set_provider(&mut self, provider: Option<String>) {
        self.provider = provider;
    }

    /// Set the store type
    pub fn set_store_type(&mut self, store_type: Option<String>) {
        self.store_type = store_type;
    }

    /// Set the store password
    pub fn set_password(&mut self, password: Option<Password>) {
        self.password = password;
    }

    /// Read the store from `path`. Clears any store bytes.
    pub fn set_source_file(&mut self, path: impl Into<PathBuf>) {
        self.source = Some(StoreSource::File(path.into()));
    }

    /// Read the store from `bytes`. Clears any store file.
    pub fn set_source_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        self.source = Some(StoreSource::Bytes(bytes.into()));
    }

    /// Forget the store source
    pub fn clear_source(&mut self) {
        self.source = None;
    }

    /// Set the manager factory algorithm
    pub fn set_factory_algorithm(&mut self, algorithm: Option<String>) {
        self.factory_algorithm = algorithm;
    }

    /// Builder form of [`Self::set_provider`]
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.set_provider(Some(provider.into()));
        self
    }

    /// Builder form of [`Self::set_store_type`]
    #[must_use]
    pub fn with_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.set_store_type(Some(store_type.into()));
        self
    }

    /// Builder form of [`Self::set_password`]
    #[must_use]
    pub fn with_password(mut self, password: impl Into<Password>) -> Self {
        self.set_password(Some(password.into()));
        self
    }

    /// Builder form of [`Self::set_source_file`]
    #[must_use]
    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.set_source_file(path);
        self
    }

    /// Builder form of [`Self::set_source_bytes`]
    #[must_use]
    pub fn with_source_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.set_source_bytes(bytes);
        self
    }

    /// Builder form of [`Self::set_factory_algorithm`]
    #[must_use]
    pub fn with_factory_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.set_factory_algorithm(Some(algorithm.into()));
        self
    }

    /// Short description of where the store comes from, safe to log
    #[must_use]
    pub fn describe_source(&self) -> String {
        match &self.source {
            Some(StoreSource::File(path)) => path.display().to_string(),
            Some(StoreSource::Bytes(bytes)) => format!("<{} bytes>", bytes.len()),
            None => "<unset>".to_string(),
        }
    }

    /// Load the store, using the platform default type if none is set
    pub fn load(&self) -> Result<LoadedStore, StoreLoadError> {
        self.load_with_default(StoreFormat::default())
    }

    /// Load the store, using `default_format` if no type is set
    pub fn load_with_default(
        &self,
        default_format: StoreFormat,
    ) -> Result<LoadedStore, StoreLoadError> {
        let format = match &self.store_type {
            Some(name) => name.parse()?,
            None => default_format,
        };

        let bytes = match &self.source {
            Some(StoreSource::File(path)) => read_store_file(path)?,
            Some(StoreSource::Bytes(bytes)) => Zeroizing::new(bytes.clone()),
            None => return Err(StoreLoadError::NotConfigured),
        };

        let store = LoadedStore::parse(format, &bytes)?;
        debug!(
            source = %self.describe_source(),
            format = %format,
            certificates = store.certificates.len(),
            has_key = store.private_key.is_some(),
            "loaded store"
        );
        Ok(store)
    }
}

fn read_store_file(path: &Path) -> Result<Zeroizing<Vec<u8>>, StoreLoadError> {
    std::fs::read(path).map(Zeroizing::new).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreLoadError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Parameters of an identity store: a store plus the password of its key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStoreParameters {
    store: StoreParameters,
    key_password: Option<Password>,
}

impl KeyStoreParameters {
    /// Empty parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing store parameters
    #[must_use]
    pub const fn from_store(store: StoreParameters) -> Self {
        Self {
            store,
            key_password: None,
        }
    }

    /// Key password as configured
    #[must_use]
    pub const fn key_password(&self) -> Option<&Password> {
        self.key_password.as_ref()
    }

    /// Key password, falling back to the store password
    #[must_use]
    pub fn effective_key_password(&self) -> Option<&Password> {
        self.key_password.as_ref().or(self.store.password.as_ref())
    }

    /// Set the key password
    pub fn set_key_password(&mut self, password: Option<Password>) {
        self.key_password = password;
    }

    /// Builder form of [`Self::set_key_password`]
    #[must_use]
    pub fn with_key_password(mut self, password: impl Into<Password>) -> Self {
        self.set_key_password(Some(password.into()));
        self
    }

    /// Apply a builder function to the underlying store parameters
    #[must_use]
    pub fn with_store(mut self, f: impl FnOnce(StoreParameters) -> StoreParameters) -> Self {
        self.store = f(self.store);
        self
    }
}

impl std::ops::Deref for KeyStoreParameters {
    type Target = StoreParameters;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl std::ops::DerefMut for KeyStoreParameters {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Private key as found in a store
pub enum StoredKey {
    /// Unencrypted key
    Plain(PrivateKeyDer<'static>),
    /// PKCS#8 `EncryptedPrivateKeyInfo`, needs the key password
    Encrypted(Zeroizing<Vec<u8>>),
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain(<redacted>)"),
            Self::Encrypted(_) => f.write_str("Encrypted(<redacted>)"),
        }
    }
}

/// Materialized content of a store
#[derive(Debug)]
pub struct LoadedStore {
    /// Format the store was parsed as
    pub format: StoreFormat,
    /// Certificates in file order
    pub certificates: Vec<CertificateDer<'static>>,
    /// Private key, identity stores only
    pub private_key: Option<StoredKey>,
}

impl LoadedStore {
    /// Parse store bytes as `format`
    pub fn parse(format: StoreFormat, bytes: &[u8]) -> Result<Self, StoreLoadError> {
        match format {
            StoreFormat::Pem => Self::parse_pem(bytes),
            StoreFormat::Der => Self::parse_der(bytes),
        }
    }

    fn parse_pem(bytes: &[u8]) -> Result<Self, StoreLoadError> {
        let blocks = pem::parse_many(bytes).map_err(|e| StoreLoadError::Malformed(e.to_string()))?;

        let mut certificates = Vec::new();
        let mut private_key = None;

        for block in blocks {
            let tag = block.tag().to_string();
            let key = match tag.as_str() {
                "CERTIFICATE" | "TRUSTED CERTIFICATE" => {
                    certificates.push(CertificateDer::from(block.into_contents()));
                    continue;
                }
                "PRIVATE KEY" => StoredKey::Plain(PrivateKeyDer::Pkcs8(
                    PrivatePkcs8KeyDer::from(block.into_contents()),
                )),
                "RSA PRIVATE KEY" => StoredKey::Plain(PrivateKeyDer::Pkcs1(
                    PrivatePkcs1KeyDer::from(block.into_contents()),
                )),
                "EC PRIVATE KEY" => StoredKey::Plain(PrivateKeyDer::Sec1(
                    PrivateSec1KeyDer::from(block.into_contents()),
                )),
                "ENCRYPTED PRIVATE KEY" => {
                    StoredKey::Encrypted(Zeroizing::new(block.into_contents()))
                }
                other => {
                    debug!(tag = other, "skipping PEM block");
                    continue;
                }
            };

            if private_key.replace(key).is_some() {
                return Err(StoreLoadError::Malformed(
                    "store holds more than one private key".to_string(),
                ));
            }
        }

        if certificates.is_empty() && private_key.is_none() {
            return Err(StoreLoadError::Malformed(
                "no certificates or keys found".to_string(),
            ));
        }

        Ok(Self {
            format: StoreFormat::Pem,
            certificates,
            private_key,
        })
    }

    fn parse_der(bytes: &[u8]) -> Result<Self, StoreLoadError> {
        // DER certificates start with a SEQUENCE tag
        if bytes.first() != Some(&0x30) {
            return Err(StoreLoadError::Malformed(
                "not a DER encoded certificate".to_string(),
            ));
        }

        Ok(Self {
            format: StoreFormat::Der,
            certificates: vec![CertificateDer::from(bytes.to_vec())],
            private_key: None,
        })
    }
}
