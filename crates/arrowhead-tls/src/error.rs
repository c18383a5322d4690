//! Error types for store loading and TLS context initialisation.

use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Result type alias for store and context initialisation
pub type TlsResult<T> = std::result::Result<T, StoreInitError>;

/// A key or trust store could not be materialized
#[derive(Error, Debug)]
pub enum StoreLoadError {
    /// Neither a store file nor store bytes were configured
    #[error("no store file or store bytes configured")]
    NotConfigured,

    /// The configured store file does not exist
    #[error("store file not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// The store file exists but could not be read
    #[error("failed to read store file {}: {source}", path.display())]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The requested store type is not supported
    #[error("unsupported store type: {0}")]
    UnsupportedFormat(String),

    /// The bytes could not be parsed as the requested store type
    #[error("malformed store: {0}")]
    Malformed(String),
}

/// Crypto material was loaded but could not be turned into a factory or context
#[derive(Error, Debug)]
pub enum CryptoInitError {
    /// Private key missing, undecryptable or unusable
    #[error("unrecoverable key: {0}")]
    UnrecoverableKey(String),

    /// Unknown key/trust manager factory algorithm
    #[error("unsupported manager factory algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Unknown crypto provider
    #[error("unsupported crypto provider: {0}")]
    UnsupportedProvider(String),

    /// Unknown or unavailable security protocol
    #[error("unsupported security protocol: {0}")]
    UnsupportedProtocol(String),

    /// Certificates or keys were rejected while building managers
    #[error("key management error: {0}")]
    KeyManagement(String),
}

/// Any failure that can occur while initialising a factory or context
#[derive(Error, Debug)]
pub enum StoreFailure {
    /// Store could not be loaded
    #[error(transparent)]
    Load(#[from] StoreLoadError),

    /// Crypto initialisation failed
    #[error(transparent)]
    Crypto(#[from] CryptoInitError),
}

impl StoreFailure {
    /// Classify the failure
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Load(StoreLoadError::NotConfigured | StoreLoadError::FileNotFound { .. }) => {
                FailureKind::StoreNotFound
            }
            Self::Load(StoreLoadError::Io { .. }) => FailureKind::Io,
            Self::Load(StoreLoadError::UnsupportedFormat(_) | StoreLoadError::Malformed(_)) => {
                FailureKind::BadFormat
            }
            Self::Crypto(CryptoInitError::UnrecoverableKey(_)) => FailureKind::UnrecoverableKey,
            Self::Crypto(CryptoInitError::UnsupportedAlgorithm(_)) => {
                FailureKind::UnsupportedAlgorithm
            }
            Self::Crypto(CryptoInitError::UnsupportedProvider(_)) => {
                FailureKind::UnsupportedProvider
            }
            Self::Crypto(CryptoInitError::UnsupportedProtocol(_)) => {
                FailureKind::UnsupportedProtocol
            }
            Self::Crypto(CryptoInitError::KeyManagement(_)) => FailureKind::KeyManagement,
        }
    }
}

/// Closed set of failure classes, each with its own diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Store file missing or no source configured
    StoreNotFound,
    /// Store file unreadable
    Io,
    /// Store bytes in the wrong format
    BadFormat,
    /// Key could not be recovered
    UnrecoverableKey,
    /// Unknown factory algorithm
    UnsupportedAlgorithm,
    /// Unknown crypto provider
    UnsupportedProvider,
    /// Unknown security protocol
    UnsupportedProtocol,
    /// Managers could not be built from the material
    KeyManagement,
}

impl FailureKind {
    /// Operator-facing description of the failure class
    #[must_use]
    pub const fn summary(&self) -> &'static str {
        match self {
            Self::StoreNotFound => "can't find store",
            Self::Io => "error loading store from file",
            Self::BadFormat => "store has an unsupported or corrupt format",
            Self::UnrecoverableKey => "store key is unrecoverable",
            Self::UnsupportedAlgorithm => "error initializing manager factory (no such algorithm)",
            Self::UnsupportedProvider => "error initializing store (no such provider)",
            Self::UnsupportedProtocol => "error initializing security context (no such protocol)",
            Self::KeyManagement => "key management error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StoreNotFound => "store_not_found",
            Self::Io => "io",
            Self::BadFormat => "bad_format",
            Self::UnrecoverableKey => "unrecoverable_key",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::UnsupportedProvider => "unsupported_provider",
            Self::UnsupportedProtocol => "unsupported_protocol",
            Self::KeyManagement => "key_management",
        };
        f.write_str(name)
    }
}

/// What was being initialised when a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitTarget {
    /// Identity (key) store and key manager factory
    KeyStore,
    /// Trust store and trust manager factory
    TrustStore,
    /// The security context itself
    Context,
}

impl std::fmt::Display for InitTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyStore => f.write_str("key store"),
            Self::TrustStore => f.write_str("trust store"),
            Self::Context => f.write_str("security context"),
        }
    }
}

/// Generic initialisation error raised in strict mode, wrapping the original cause
#[derive(Error, Debug)]
#[error("failed to initialise {target}: {source}")]
pub struct StoreInitError {
    /// What was being initialised
    pub target: InitTarget,
    /// Original cause
    #[source]
    pub source: StoreFailure,
}

impl StoreInitError {
    /// Classification of the underlying cause
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.source.kind()
    }

    /// Returns the store load error, if that was the cause
    #[must_use]
    pub const fn load_error(&self) -> Option<&StoreLoadError> {
        match &self.source {
            StoreFailure::Load(e) => Some(e),
            StoreFailure::Crypto(_) => None,
        }
    }

    /// Returns the crypto error, if that was the cause
    #[must_use]
    pub const fn crypto_error(&self) -> Option<&CryptoInitError> {
        match &self.source {
            StoreFailure::Crypto(e) => Some(e),
            StoreFailure::Load(_) => None,
        }
    }
}

impl From<StoreInitError> for arrowhead_core::ArrowheadError {
    fn from(err: StoreInitError) -> Self {
        Self::Tls {
            message: format!("{} ({})", err.kind().summary(), err.target),
            source: Box::new(err),
        }
    }
}

/// Log a failure once and apply the strict/lenient policy.
///
/// In strict mode the failure is raised as [`StoreInitError`]; otherwise it
/// degrades to `Ok(None)` so the caller can continue with partial material.
pub(crate) fn settle<T>(
    target: InitTarget,
    location: &str,
    outcome: Result<T, StoreFailure>,
    strict: bool,
) -> TlsResult<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(failure) => {
            let kind = failure.kind();
            warn!(
                target_material = %target,
                source = location,
                kind = %kind,
                error = %failure,
                strict,
                "{}", kind.summary()
            );
            if strict {
                Err(StoreInitError {
                    target,
                    source: failure,
                })
            } else {
                Ok(None)
            }
        }
    }
}
