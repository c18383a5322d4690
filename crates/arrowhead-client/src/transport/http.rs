//! [`Transport`] implementation on top of reqwest.

use super::{Method, Transport};
use arc_swap::ArcSwap;
use arrowhead_core::{TransportError, TransportProtocol};
use arrowhead_tls::{rustls, HostnameVerifier, SecurityContext};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP(S) transport.
///
/// Installing a security context rebuilds the underlying client and swaps it
/// in atomically; requests already in flight finish on the old one.
#[derive(Debug)]
pub struct HttpTransport {
    protocol: TransportProtocol,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
    http: ArcSwap<HttpClient>,
}

impl HttpTransport {
    /// HTTPS transport with default settings
    pub fn new(protocol: TransportProtocol) -> Result<Self, TransportError> {
        HttpTransportBuilder::new(protocol).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(protocol: TransportProtocol) -> HttpTransportBuilder {
        HttpTransportBuilder::new(protocol)
    }

    fn client_builder(&self) -> reqwest::ClientBuilder {
        HttpClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
    }

    /// Handle an API response that returns JSON (or nothing)
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(map_request_error)?;
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
        } else {
            Err(self.handle_error(status.as_u16(), response).await)
        }
    }

    /// Convert an error response to a [`TransportError`]
    async fn handle_error(&self, status: u16, response: reqwest::Response) -> TransportError {
        let body = response.text().await.unwrap_or_default();

        // Arrowhead services report failures as {"errorMessage": ...}
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("errorMessage")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .unwrap_or(body);

        match status {
            401 | 403 => {
                warn!(status, "request rejected by remote authority");
                TransportError::Unauthorized {
                    code: status,
                    message,
                }
            }
            _ => TransportError::Status {
                code: status,
                message,
            },
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        if url.scheme() != self.protocol.scheme() {
            return Err(TransportError::InvalidUrl(format!(
                "{url} does not use {}",
                self.protocol.scheme()
            )));
        }
        debug!(method = %method, url = %url, "{method} request");

        let http = self.http.load_full();
        let request = match method {
            Method::Get => http.get(url.as_str()),
            Method::Put => http.put(url.as_str()),
            Method::Post => http.post(url.as_str()),
        };
        let request = match &body {
            Some(body) => request.json(body),
            None => request,
        };

        let response = request.send().await.map_err(map_request_error)?;
        self.handle_response(response).await
    }

    fn install_security_context(
        &self,
        context: Arc<SecurityContext>,
        hostname_verifier: Arc<dyn HostnameVerifier>,
    ) -> Result<(), TransportError> {
        if !self.protocol.is_secure() {
            debug!("ignoring security context on plain HTTP transport");
            return Ok(());
        }

        let tls = context
            .client_config(hostname_verifier)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let http = self
            .client_builder()
            .use_preconfigured_tls(tls)
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        if context.is_insecure() {
            warn!("installed security context that does not validate servers");
        } else {
            debug!(
                protocol = %context.protocol(),
                client_auth = context.has_identity(),
                "installed security context"
            );
        }
        self.http.store(Arc::new(http));
        Ok(())
    }

    fn protocol(&self) -> TransportProtocol {
        self.protocol
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if is_tls_failure(&err) {
        TransportError::Tls(error_chain(&err))
    } else if err.is_timeout() {
        TransportError::Timeout(error_chain(&err))
    } else if err.is_connect() {
        TransportError::Connect(error_chain(&err))
    } else if err.is_decode() {
        TransportError::Decode(error_chain(&err))
    } else if err.is_builder() {
        TransportError::InvalidUrl(error_chain(&err))
    } else {
        TransportError::Http(error_chain(&err))
    }
}

/// Chain text of connect errors that failed on the server certificate or
/// the handshake, matched case-insensitively
const TLS_FAILURE_MARKERS: &[&str] = &["certificate", "handshakefailure"];

/// reqwest reports handshake failures as connect errors; look for the rustls
/// error underneath so certificate problems are not retried.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if is_rustls_error(e) {
            return true;
        }
        source = e.source();
    }

    // io::Error::source skips the wrapped error, so the cause may only
    // survive in the rendered chain
    err.is_connect() && {
        let chain = error_chain(err).to_ascii_lowercase();
        TLS_FAILURE_MARKERS.iter().any(|marker| chain.contains(marker))
    }
}

fn is_rustls_error(e: &(dyn std::error::Error + 'static)) -> bool {
    if e.downcast_ref::<rustls::Error>().is_some() {
        return true;
    }
    e.downcast_ref::<std::io::Error>()
        .and_then(std::io::Error::get_ref)
        .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some())
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}

/// Builder for configuring an [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    protocol: TransportProtocol,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl HttpTransportBuilder {
    /// Create a new builder for `protocol`
    #[must_use]
    pub fn new(protocol: TransportProtocol) -> Self {
        Self {
            protocol,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("arrowhead-rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Build the transport. HTTPS transports start out trusting the bundled
    /// web PKI roots until a security context is installed.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(HttpTransport {
            protocol: self.protocol,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            user_agent: self.user_agent,
            http: ArcSwap::from_pointee(http),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TlsServer;
    use arrowhead_tls::{
        NoopHostnameVerifier, StrictHostnameVerifier, TlsContextConfigurator, TlsProtocol,
    };
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> Arc<dyn Transport> {
        Arc::new(HttpTransport::new(TransportProtocol::Http).unwrap())
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_put_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/echo"))
            .and(body_json(json!({"name": "thermometer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value: Value = transport()
            .put(&url(&server, "/echo"), &json!({"name": "thermometer"}))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value: Value = transport().get(&url(&server, "/echo")).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/denied"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"errorMessage": "bad cert"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let t = transport();

        let err = t.get::<Value>(&url(&server, "/denied")).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Unauthorized {
                code: 401,
                message: "bad cert".to_string()
            }
        );
        assert!(!err.is_transient());

        let err = t.get::<Value>(&url(&server, "/busy")).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(err.is_transient());

        let err = t.get::<Value>(&url(&server, "/broken")).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Url::parse(&format!("http://127.0.0.1:{port}/onboarding")).unwrap();
        let err = transport().get::<Value>(&target).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "{err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_scheme_must_match_protocol() {
        let https = Url::parse("https://localhost:8443/serviceregistry").unwrap();
        let err = transport().get::<Value>(&https).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_install_security_context() {
        let transport = HttpTransport::new(TransportProtocol::Https).unwrap();
        let before = transport.http.load_full();

        let context = SecurityContext::init(TlsProtocol::Any, None, None).unwrap();
        transport
            .install_security_context(Arc::new(context), NoopHostnameVerifier::shared())
            .unwrap();
        assert!(!Arc::ptr_eq(&before, &transport.http.load_full()));
    }

    #[tokio::test]
    async fn test_untrusted_certificate_is_terminal() {
        let server = TlsServer::start();
        let transport = HttpTransport::new(TransportProtocol::Https).unwrap();
        let context = SecurityContext::init(TlsProtocol::Any, None, None).unwrap();
        transport
            .install_security_context(Arc::new(context), Arc::new(StrictHostnameVerifier))
            .unwrap();

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let err = transport.get::<Value>(&server.url("/onboarding/name")).await.unwrap_err();
        assert!(matches!(err, TransportError::Tls(_)), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_trust_all_handshake() {
        let server = TlsServer::start();
        let context = TlsContextConfigurator::empty()
            .create_trust_all_context(true)
            .unwrap()
            .unwrap();
        assert!(context.is_insecure());

        let transport = HttpTransport::new(TransportProtocol::Https).unwrap();
        transport
            .install_security_context(Arc::new(context), NoopHostnameVerifier::shared())
            .unwrap();

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let value: Value = transport.get(&server.url("/onboarding/name")).await.unwrap();
        assert_eq!(value["ok"], true);
    }
}
