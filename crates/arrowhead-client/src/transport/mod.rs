//! Transport abstraction used by the onboarding bootstrap and service clients.

mod http;

pub use http::{HttpTransport, HttpTransportBuilder};

use arrowhead_core::{TransportError, TransportProtocol};
use arrowhead_tls::{HostnameVerifier, SecurityContext};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// HTTP verbs the Arrowhead services use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
}

impl Method {
    /// Upper-case verb name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves JSON documents to and from remote systems.
///
/// Implementations own their connection state; a security context installed
/// with [`Transport::install_security_context`] applies to every request made
/// afterwards.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Send `body` to `url` and return the decoded JSON response.
    ///
    /// An empty response body is returned as [`Value::Null`].
    async fn exchange(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;

    /// Replace the TLS material used for subsequent connections
    fn install_security_context(
        &self,
        context: Arc<SecurityContext>,
        hostname_verifier: Arc<dyn HostnameVerifier>,
    ) -> Result<(), TransportError>;

    /// Protocol this transport speaks
    fn protocol(&self) -> TransportProtocol;
}

impl dyn Transport {
    /// GET `url` and decode the response as `T`
    pub async fn get<T: DeserializeOwned>(&self, url: &Url) -> Result<T, TransportError> {
        let value = self.exchange(Method::Get, url, None).await?;
        decode(value)
    }

    /// PUT `body` to `url` and decode the response as `T`
    pub async fn put<T, B>(&self, url: &Url, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let value = self.exchange(Method::Put, url, Some(encode(body)?)).await?;
        decode(value)
    }

    /// POST `body` to `url` and decode the response as `T`
    pub async fn post<T, B>(&self, url: &Url, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let value = self.exchange(Method::Post, url, Some(encode(body)?)).await?;
        decode(value)
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, TransportError> {
    serde_json::to_value(body).map_err(|e| TransportError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Append path segments to `base`, keeping its existing path
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| TransportError::InvalidUrl(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
