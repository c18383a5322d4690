use crate::types::CoreSystem;
use thiserror::Error;

/// Result type alias for Arrowhead client operations
pub type Result<T> = std::result::Result<T, ArrowheadError>;

/// Errors raised by a transport while talking to a remote system
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// TCP connection could not be established (refused, reset, unreachable)
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Remote authority rejected our credentials
    #[error("authentication rejected ({code}): {message}")]
    Unauthorized {
        /// HTTP status code (401 or 403)
        code: u16,
        /// Error message returned by the remote side
        message: String,
    },

    /// Remote side answered with a non-success status
    #[error("HTTP {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Error message returned by the remote side
        message: String,
    },

    /// TLS handshake or certificate validation failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Request body could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// Response body could not be decoded into the expected type
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Any other HTTP client failure
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl TransportError {
    /// Returns true if retrying the same request may succeed.
    ///
    /// Connection failures, timeouts and gateway/availability statuses are
    /// transient. Everything else, including rejected authentication, is
    /// terminal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Status { code, .. } => matches!(code, 502..=504),
            _ => false,
        }
    }

    /// Returns the HTTP status code carried by this error, if any
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { code, .. } | Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors that can occur when bootstrapping or using an Arrowhead client
#[derive(Error, Debug)]
pub enum ArrowheadError {
    /// Configuration is invalid or missing required material
    #[error("configuration error: {0}")]
    Config(String),

    /// Target host name could not be resolved
    #[error("could not resolve {host}: {reason}")]
    Resolve {
        /// Host name that failed to resolve
        host: String,
        /// Resolver error message
        reason: String,
    },

    /// TLS material could not be loaded or initialised
    #[error("TLS setup failed: {message}")]
    Tls {
        /// Human readable summary
        message: String,
        /// Underlying store or crypto failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport failure talking to a remote system
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No endpoint is known for the requested core system
    #[error("no endpoint known for {0}")]
    MissingEndpoint(CoreSystem),

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArrowheadError {
    /// Returns true if the error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true for errors caused by local misconfiguration
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Resolve { .. } | Self::Tls { .. } | Self::MissingEndpoint(_)
        )
    }

    /// Returns the underlying transport error, if this is one
    #[must_use]
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Timeout("30s".into()).is_transient());
        assert!(TransportError::Status {
            code: 503,
            message: String::new()
        }
        .is_transient());

        assert!(!TransportError::Unauthorized {
            code: 401,
            message: String::new()
        }
        .is_transient());
        assert!(!TransportError::Status {
            code: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!TransportError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_arrowhead_error_helpers() {
        let err = ArrowheadError::from(TransportError::Connect("refused".into()));
        assert!(err.is_retryable());
        assert!(!err.is_config_error());
        assert_eq!(
            err.transport(),
            Some(&TransportError::Connect("refused".into()))
        );

        let err = ArrowheadError::Config("bad".into());
        assert!(!err.is_retryable());
        assert!(err.is_config_error());
    }
}
