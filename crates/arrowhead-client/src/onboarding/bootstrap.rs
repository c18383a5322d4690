//! Onboarding bootstrap: prepare TLS material, then run the retrying
//! onboarding exchange.

use super::config::OnboardingConfig;
use crate::endpoints::EndpointTable;
use crate::registry::ServiceRegistryClient;
use crate::transport::{join_path, Transport};
use arrowhead_core::{
    ArrowheadError, CoreSystem, IssuedCertificate, OnboardingRequest, OnboardingResponse, Result,
};
use arrowhead_tls::{
    CryptoInitError, HostnameVerifier, NoopHostnameVerifier, SecurityContext,
    StrictHostnameVerifier, TlsContextConfigurator, TlsProtocol,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use pem::{EncodeConfig, LineEnding, Pem};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Where a bootstrap is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    /// Collecting configuration
    Configuring,
    /// Address resolved and security context built
    ContextReady,
    /// Onboarding exchange in progress
    Attempting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Device onboarded
    Succeeded,
    /// Every attempt failed with a transient error
    Exhausted,
    /// Stopped by a terminal error or cancellation
    Aborted,
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuring => f.write_str("configuring"),
            Self::ContextReady => f.write_str("context ready"),
            Self::Attempting { attempt } => write!(f, "attempting (#{attempt})"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Exhausted => f.write_str("exhausted"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Onboarding bootstrap that has not yet resolved its target or built TLS
/// material
#[derive(Debug)]
pub struct OnboardingBootstrap {
    config: OnboardingConfig,
    transport: Arc<dyn Transport>,
}

impl OnboardingBootstrap {
    /// Bootstrap `config` over `transport`
    #[must_use]
    pub fn new(config: OnboardingConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Always [`BootstrapState::Configuring`]
    #[must_use]
    pub const fn state(&self) -> BootstrapState {
        BootstrapState::Configuring
    }

    /// Resolve the onboarding controller and build the security context.
    ///
    /// TLS material is taken from the first source present: explicit
    /// context, explicit factories, explicit configurator, or a configurator
    /// built from the configured defaults.
    pub async fn prepare(self) -> Result<PreparedBootstrap> {
        let Self { config, transport } = self;
        let protocol = transport.protocol();

        if config.common_name.trim().is_empty() {
            return Err(ArrowheadError::Config(
                "a device common name is required for onboarding".to_string(),
            ));
        }

        let insecure = config.insecure && protocol.is_secure();
        if config.insecure && !protocol.is_secure() {
            debug!("insecure onboarding requested over plain HTTP, nothing to relax");
        }
        if insecure && !config.allow_insecure {
            return Err(ArrowheadError::Config(
                "insecure onboarding requires allow_insecure_bootstrap to be enabled".to_string(),
            ));
        }

        let address = resolve(&config.host, config.port).await?;
        debug!(host = %config.host, address = %address, "resolved onboarding controller");

        let context = if !protocol.is_secure() {
            None
        } else if insecure {
            Some(insecure_context(&config)?)
        } else {
            Some(select_context(&config)?)
        };
        let hostname_verifier: Arc<dyn HostnameVerifier> = if insecure {
            NoopHostnameVerifier::shared()
        } else {
            Arc::new(StrictHostnameVerifier)
        };

        let prepared = PreparedBootstrap {
            config,
            transport,
            address,
            context,
            hostname_verifier,
            state: Mutex::new(BootstrapState::ContextReady),
        };
        info!(bootstrap = %prepared, "onboarding bootstrap ready");
        Ok(prepared)
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let resolve_error = |reason: String| ArrowheadError::Resolve {
        host: host.to_string(),
        reason,
    };
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .next()
        .ok_or_else(|| resolve_error("no addresses found".to_string()))
}

fn tls_error(err: CryptoInitError) -> ArrowheadError {
    ArrowheadError::Tls {
        message: err.to_string(),
        source: Box::new(err),
    }
}

fn configurator_for(config: &OnboardingConfig) -> TlsContextConfigurator {
    config
        .configurator
        .clone()
        .unwrap_or_else(|| TlsContextConfigurator::new(config.defaults.clone()))
}

fn select_context(config: &OnboardingConfig) -> Result<Arc<SecurityContext>> {
    if let Some(context) = &config.context {
        debug!("using explicit security context");
        return Ok(Arc::clone(context));
    }

    if config.identity_factory.is_some() || config.trust_factory.is_some() {
        debug!("building security context from explicit factories");
        let protocol = configurator_for(config)
            .protocol()
            .parse::<TlsProtocol>()
            .map_err(tls_error)?;
        let context = SecurityContext::init(
            protocol,
            config.identity_factory.as_ref(),
            config.trust_factory.as_ref(),
        )
        .map_err(tls_error)?;
        return Ok(Arc::new(context));
    }

    if config.configurator.is_some() {
        debug!("building security context from explicit configurator");
    } else {
        debug!("building security context from defaults");
    }
    configurator_for(config)
        .create_mutual_context(config.strict)?
        .map(Arc::new)
        .ok_or_else(|| ArrowheadError::Config("no usable TLS material for onboarding".to_string()))
}

fn insecure_context(config: &OnboardingConfig) -> Result<Arc<SecurityContext>> {
    warn!(
        host = %config.host,
        "using built-in trust-all security context for onboarding"
    );
    configurator_for(config)
        .create_trust_all_context(config.strict)?
        .map(Arc::new)
        .ok_or_else(|| ArrowheadError::Config("trust-all security context unavailable".to_string()))
}

/// Bootstrap with a resolved target and a memoised security context.
///
/// [`Self::run`] may be called again after a failure; every run reuses the
/// same TLS material.
#[derive(Debug)]
pub struct PreparedBootstrap {
    config: OnboardingConfig,
    transport: Arc<dyn Transport>,
    address: SocketAddr,
    context: Option<Arc<SecurityContext>>,
    hostname_verifier: Arc<dyn HostnameVerifier>,
    state: Mutex<BootstrapState>,
}

impl PreparedBootstrap {
    /// Resolved controller address
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Security context used for onboarding; `None` over plain HTTP
    #[must_use]
    pub fn security_context(&self) -> Option<&Arc<SecurityContext>> {
        self.context.as_ref()
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: BootstrapState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Base URL of the onboarding controller
    pub fn onboarding_base(&self) -> Result<Url> {
        let host = match self.config.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]", self.config.host),
            _ => self.config.host.clone(),
        };
        let scheme = self.transport.protocol().scheme();
        let base = format!(
            "{scheme}://{host}:{}/{}",
            self.config.port,
            CoreSystem::Onboarding.base_path()
        );
        Url::parse(&base).map_err(|e| ArrowheadError::Config(format!("bad onboarding URL {base}: {e}")))
    }

    fn onboarding_url(&self) -> Result<Url> {
        // devices holding a certificate authenticate with it, others by name
        let method = match &self.context {
            Some(context) if context.has_identity() => "certificate",
            _ => "name",
        };
        Ok(join_path(&self.onboarding_base()?, &[method])?)
    }

    fn request(&self) -> OnboardingRequest {
        let request = OnboardingRequest::new(self.config.common_name.clone());
        match &self.config.key_pair {
            Some(key_pair) => request.with_key_pair(key_pair.clone()),
            None => request,
        }
    }

    /// Run the onboarding exchange.
    ///
    /// Transient transport errors are retried after the configured delay
    /// until the attempts run out; the last error is then returned. Terminal
    /// errors are returned immediately. `cancel` is checked before every
    /// attempt and while waiting between attempts.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<OnboardedClient> {
        if let Some(context) = &self.context {
            if context.is_insecure() {
                warn!(
                    host = %self.config.host,
                    "onboarding without server certificate validation"
                );
            }
            self.transport.install_security_context(
                Arc::clone(context),
                Arc::clone(&self.hostname_verifier),
            )?;
        }

        let url = self.onboarding_url()?;
        let request = self.request();
        let policy = self.config.retry;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(attempt));
            }
            attempt += 1;
            self.set_state(BootstrapState::Attempting { attempt });
            debug!(url = %url, attempt, "sending onboarding request");

            let err = match self
                .transport
                .post::<OnboardingResponse, _>(&url, &request)
                .await
            {
                Ok(response) => {
                    let outcome = self.finish(response, attempt);
                    if let Err(err) = &outcome {
                        warn!(attempt, error = %err, "issued certificate is unusable");
                        self.set_state(BootstrapState::Aborted);
                    }
                    return outcome;
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                warn!(attempt, error = %err, "onboarding rejected");
                self.set_state(BootstrapState::Aborted);
                return Err(err.into());
            }
            if attempt >= policy.max_attempts() {
                warn!(attempt, error = %err, "onboarding attempts exhausted");
                self.set_state(BootstrapState::Exhausted);
                return Err(err.into());
            }

            info!(
                attempt,
                max_attempts = policy.max_attempts(),
                delay = ?policy.delay(),
                error = %err,
                "onboarding attempt failed, retrying"
            );
            tokio::select! {
                () = cancel.cancelled() => return Err(self.cancelled(attempt)),
                () = tokio::time::sleep(policy.delay()) => {}
            }
        }
    }

    fn cancelled(&self, attempts: u32) -> ArrowheadError {
        info!(attempts, "onboarding cancelled");
        self.set_state(BootstrapState::Aborted);
        ArrowheadError::Cancelled
    }

    fn finish(&self, response: OnboardingResponse, attempt: u32) -> Result<OnboardedClient> {
        let protocol = self.transport.protocol();
        let endpoints = Arc::new(EndpointTable::new(protocol));
        endpoints.add(CoreSystem::Onboarding, self.onboarding_base()?);
        for endpoint in response.endpoints() {
            endpoints.add(endpoint.system, endpoint.uri.clone());
        }

        let (context, material) = if protocol.is_secure() {
            let material = self.issued_material(&response)?;
            let context = Arc::new(self.issued_context(&material)?);
            self.transport
                .install_security_context(Arc::clone(&context), Arc::new(StrictHostnameVerifier))?;
            (Some(context), Some(material))
        } else {
            (None, None)
        };

        self.set_state(BootstrapState::Succeeded);
        info!(attempt, endpoints = %endpoints, "onboarding succeeded");

        Ok(OnboardedClient {
            transport: Arc::clone(&self.transport),
            endpoints,
            context,
            material,
            certificate: response.onboarding_certificate,
            address: self.address,
        })
    }

    /// PEM bundles for the issued identity and the cloud's trust chain
    fn issued_material(&self, response: &OnboardingResponse) -> Result<IssuedMaterial> {
        let issued = &response.onboarding_certificate;
        let private_key = issued
            .key_pair
            .private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                self.config
                    .key_pair
                    .as_ref()
                    .and_then(|k| k.private_key.as_deref())
            })
            .ok_or_else(|| {
                ArrowheadError::Config(
                    "onboarding response carries no private key and none was supplied".to_string(),
                )
            })?;

        let intermediate = pem_block("CERTIFICATE", &response.intermediate_certificate)?;
        let identity = [
            pem_block("CERTIFICATE", &issued.certificate)?,
            intermediate.clone(),
            pem_block("PRIVATE KEY", private_key)?,
        ]
        .concat();
        let trust = [intermediate, pem_block("CERTIFICATE", &response.root_certificate)?].concat();

        Ok(IssuedMaterial { identity, trust })
    }

    /// Mutual TLS context from the issued material
    fn issued_context(&self, material: &IssuedMaterial) -> Result<SecurityContext> {
        let protocol = self
            .context
            .as_ref()
            .map_or_else(|| configurator_for(&self.config).protocol().to_string(), |c| {
                c.protocol().name().to_string()
            });

        let mut configurator = TlsContextConfigurator::new(self.config.defaults.clone());
        configurator
            .set_key_store_bytes(material.identity.as_bytes())
            .set_key_store_type("PEM")
            .set_trust_store_bytes(material.trust.as_bytes())
            .set_trust_store_type("PEM")
            .set_protocol(protocol);

        configurator
            .create_mutual_context(true)?
            .ok_or_else(|| ArrowheadError::Config("issued certificate is unusable".to_string()))
    }
}

impl std::fmt::Display for PreparedBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OnboardingBootstrap [address='{}' ({}), retries={}, delay={:?}, insecure={}]",
            self.config.host,
            self.address,
            self.config.retry.max_attempts(),
            self.config.retry.delay(),
            self.context.as_ref().is_some_and(|c| c.is_insecure()),
        )
    }
}

/// PEM text for `body`, which is either PEM already or bare base64 DER.
/// An empty body yields an empty string.
fn pem_block(tag: &str, body: &str) -> Result<String> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(String::new());
    }

    let blocks = if body.starts_with("-----BEGIN") {
        pem::parse_many(body).map_err(|e| malformed(tag, &e))?
    } else {
        let compact: String = body.split_whitespace().collect();
        let der = B64.decode(compact).map_err(|e| malformed(tag, &e))?;
        vec![Pem::new(tag, der)]
    };

    Ok(blocks
        .iter()
        .map(|block| {
            pem::encode_config(block, EncodeConfig::new().set_line_ending(LineEnding::LF))
        })
        .collect())
}

fn malformed(tag: &str, err: &dyn std::fmt::Display) -> ArrowheadError {
    ArrowheadError::Config(format!("issued {tag} is neither PEM nor base64: {err}"))
}

#[derive(Clone)]
struct IssuedMaterial {
    identity: String,
    trust: String,
}

/// A device that completed onboarding
#[derive(Clone)]
pub struct OnboardedClient {
    transport: Arc<dyn Transport>,
    endpoints: Arc<EndpointTable>,
    context: Option<Arc<SecurityContext>>,
    material: Option<IssuedMaterial>,
    certificate: IssuedCertificate,
    address: SocketAddr,
}

impl std::fmt::Debug for OnboardedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardedClient")
            .field("transport", &self.transport)
            .field("endpoints", &self.endpoints)
            .field("context", &self.context)
            .field("certificate", &self.certificate)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl OnboardedClient {
    /// Transport carrying the issued identity
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Core system endpoints handed out by the controller
    #[must_use]
    pub const fn endpoints(&self) -> &Arc<EndpointTable> {
        &self.endpoints
    }

    /// Endpoint of `system`
    pub fn endpoint(&self, system: CoreSystem) -> Result<Url> {
        self.endpoints
            .get(system)
            .ok_or(ArrowheadError::MissingEndpoint(system))
    }

    /// Client for the service registry
    pub fn service_registry(&self) -> Result<ServiceRegistryClient> {
        let base = self.endpoint(CoreSystem::ServiceRegistry)?;
        Ok(ServiceRegistryClient::new(self.transport(), base))
    }

    /// Mutual TLS context built from the issued certificate
    #[must_use]
    pub fn security_context(&self) -> Option<&Arc<SecurityContext>> {
        self.context.as_ref()
    }

    /// Certificate issued to this device
    #[must_use]
    pub const fn certificate(&self) -> &IssuedCertificate {
        &self.certificate
    }

    /// Address of the onboarding controller
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Issued certificate, cloud intermediate and private key as one PEM
    /// bundle; `None` over plain HTTP
    #[must_use]
    pub fn identity_pem(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.identity.as_str())
    }

    /// Intermediate and root certificates as one PEM bundle; `None` over
    /// plain HTTP
    #[must_use]
    pub fn trust_pem(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.trust.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::DelayUnit;
    use crate::test_support::TlsServer;
    use crate::transport::{HttpTransport, Method};
    use arrowhead_core::{TransportError, TransportProtocol};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct StubTransport {
        protocol: TransportProtocol,
        failures: Mutex<VecDeque<TransportError>>,
        response: Value,
        attempts: AtomicU32,
        installs: Mutex<Vec<bool>>,
    }

    impl StubTransport {
        fn new(protocol: TransportProtocol, failures: Vec<TransportError>, response: Value) -> Arc<Self> {
            Arc::new(Self {
                protocol,
                failures: Mutex::new(failures.into()),
                response,
                attempts: AtomicU32::new(0),
                installs: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        fn installs(&self) -> Vec<bool> {
            self.installs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn exchange(
            &self,
            method: Method,
            url: &Url,
            body: Option<Value>,
        ) -> std::result::Result<Value, TransportError> {
            assert_eq!(method, Method::Post);
            assert_eq!(url.path(), "/onboarding/name");
            assert_eq!(body.unwrap()["creationRequest"]["commonName"], "device-1");

            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(self.response.clone()),
            }
        }

        fn install_security_context(
            &self,
            context: Arc<SecurityContext>,
            _hostname_verifier: Arc<dyn HostnameVerifier>,
        ) -> std::result::Result<(), TransportError> {
            self.installs.lock().unwrap().push(context.is_insecure());
            Ok(())
        }

        fn protocol(&self) -> TransportProtocol {
            self.protocol
        }
    }

    fn refused() -> TransportError {
        TransportError::Connect("connection refused".to_string())
    }

    fn endpoint(system: &str, path: &str) -> Value {
        json!({"system": system, "uri": format!("http://127.0.0.1:9000/{path}")})
    }

    fn response(certificate: &str, private_key: &str, ca: &str) -> Value {
        json!({
            "deviceRegistry": endpoint("device_registry", "deviceregistry"),
            "systemRegistry": endpoint("system_registry", "systemregistry"),
            "serviceRegistry": endpoint("service_registry", "serviceregistry"),
            "orchestrationService": endpoint("orchestrator", "orchestrator"),
            "onboardingCertificate": {
                "certificate": certificate,
                "keyPair": {"publicKey": "", "privateKey": private_key}
            },
            "intermediateCertificate": ca,
            "rootCertificate": ca
        })
    }

    fn plain_response() -> Value {
        response("", "", "")
    }

    /// CA certificate, leaf certificate and leaf key, all PEM
    fn issued_chain() -> (String, String, String) {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = rcgen::KeyPair::generate().unwrap();
        let leaf = rcgen::CertificateParams::new(vec!["device-1".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &ca, &ca_key)
            .unwrap();
        (ca.pem(), leaf.pem(), leaf_key.serialize_pem())
    }

    fn config() -> OnboardingConfig {
        OnboardingConfig::new("device-1")
            .with_onboarding_address("127.0.0.1")
            .with_port(8435)
    }

    async fn prepare(config: OnboardingConfig, transport: Arc<StubTransport>) -> PreparedBootstrap {
        OnboardingBootstrap::new(config, transport)
            .prepare()
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let transport = StubTransport::new(
            TransportProtocol::Http,
            vec![refused(), TransportError::Timeout("slow".to_string()), refused()],
            plain_response(),
        );
        let bootstrap = prepare(config().with_retries(4), Arc::clone(&transport)).await;
        assert_eq!(bootstrap.state(), BootstrapState::ContextReady);

        let start = Instant::now();
        let client = bootstrap.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(transport.attempts(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert_eq!(bootstrap.state(), BootstrapState::Succeeded);
        assert!(client.security_context().is_none());
        assert!(client.identity_pem().is_none());
        assert_eq!(client.endpoints().len(), 5);
        assert_eq!(
            client.service_registry().unwrap().base().path(),
            "/serviceregistry"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let failures = (1..=5)
            .map(|n| TransportError::Timeout(format!("attempt {n}")))
            .collect();
        let transport = StubTransport::new(TransportProtocol::Http, failures, plain_response());
        let bootstrap = prepare(
            config().with_delay(2, DelayUnit::Seconds),
            Arc::clone(&transport),
        )
        .await;

        let start = Instant::now();
        let err = bootstrap.run(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(transport.attempts(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(bootstrap.state(), BootstrapState::Exhausted);
        assert_eq!(
            err.transport(),
            Some(&TransportError::Timeout("attempt 3".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let rejected = TransportError::Unauthorized {
            code: 401,
            message: "unknown device".to_string(),
        };
        let transport =
            StubTransport::new(TransportProtocol::Http, vec![rejected.clone()], plain_response());
        let bootstrap = prepare(config().with_maximum_retries(), Arc::clone(&transport)).await;

        let start = Instant::now();
        let err = bootstrap.run(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(transport.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(err.transport(), Some(&rejected));
        assert_eq!(bootstrap.state(), BootstrapState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_unbounded_retries() {
        let failures = (0..100).map(|_| refused()).collect();
        let transport = StubTransport::new(TransportProtocol::Http, failures, plain_response());
        let bootstrap = prepare(config().with_maximum_retries(), Arc::clone(&transport)).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let err = bootstrap.run(&cancel).await.unwrap_err();
        assert!(matches!(err, ArrowheadError::Cancelled));
        assert_eq!(transport.attempts(), 3);
        assert_eq!(bootstrap.state(), BootstrapState::Aborted);
    }

    #[tokio::test]
    async fn test_insecure_mode_requires_opt_in() {
        let transport = StubTransport::new(TransportProtocol::Https, vec![], plain_response());
        let err = OnboardingBootstrap::new(config().with_insecure_ssl_context(), transport)
            .prepare()
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_insecure_mode_is_ignored_over_http() {
        let transport = StubTransport::new(TransportProtocol::Http, vec![], plain_response());
        let bootstrap = prepare(config().with_insecure_ssl_context(), Arc::clone(&transport)).await;
        assert!(bootstrap.security_context().is_none());

        bootstrap.run(&CancellationToken::new()).await.unwrap();
        assert!(transport.installs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insecure_context_built_once_then_replaced() {
        let (ca, leaf, key) = issued_chain();
        let transport = StubTransport::new(
            TransportProtocol::Https,
            vec![refused(), refused()],
            response(&leaf, &key, &ca),
        );
        let config = config()
            .with_insecure_ssl_context()
            .with_insecure_ssl_context()
            .with_allow_insecure_bootstrap(true);
        let bootstrap = prepare(config, Arc::clone(&transport)).await;

        let insecure = Arc::clone(bootstrap.security_context().unwrap());
        assert!(insecure.is_insecure());

        let client = bootstrap.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(transport.attempts(), 3);
        // one trust-all install for the whole retry cycle, then the issued identity
        assert_eq!(transport.installs(), vec![true, false]);
        assert!(Arc::ptr_eq(&insecure, bootstrap.security_context().unwrap()));

        assert!(client.identity_pem().unwrap().contains("PRIVATE KEY"));
        assert_eq!(client.trust_pem().unwrap().matches("BEGIN CERTIFICATE").count(), 2);

        let issued = client.security_context().unwrap();
        assert!(issued.has_identity());
        assert!(!issued.is_insecure());
        assert_eq!(issued.trust_managers().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_context_wins_over_configurator() {
        let mut broken = TlsContextConfigurator::empty();
        broken.set_trust_store_file("/nonexistent/truststore.pem");

        let explicit = Arc::new(SecurityContext::init(TlsProtocol::Tls13, None, None).unwrap());
        let config = config()
            .with_configurator(broken.clone())
            .with_security_context(Arc::clone(&explicit));

        let transport = StubTransport::new(TransportProtocol::Https, vec![], plain_response());
        let bootstrap = prepare(config, transport).await;
        assert!(Arc::ptr_eq(bootstrap.security_context().unwrap(), &explicit));

        // without the explicit context the strict configurator fails
        let transport = StubTransport::new(TransportProtocol::Https, vec![], plain_response());
        let err = OnboardingBootstrap::new(self::config().with_configurator(broken), transport)
            .prepare()
            .await
            .unwrap_err();
        assert!(matches!(err, ArrowheadError::Tls { .. }));
    }

    #[tokio::test]
    async fn test_common_name_required() {
        let transport = StubTransport::new(TransportProtocol::Http, vec![], plain_response());
        let err = OnboardingBootstrap::new(OnboardingConfig::new("  "), transport)
            .prepare()
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_onboarding_over_http_with_wiremock() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/onboarding/name"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/onboarding/name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(plain_response()))
            .with_priority(2)
            .mount(&server)
            .await;

        let address = server.address();
        let config = OnboardingConfig::new("device-1")
            .with_onboarding_address(address.ip().to_string())
            .with_port(address.port())
            .with_delay(10, DelayUnit::Millis);
        let transport = Arc::new(HttpTransport::new(TransportProtocol::Http).unwrap());

        let bootstrap = OnboardingBootstrap::new(config, transport)
            .prepare()
            .await
            .unwrap();
        let client = bootstrap.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(client.address(), *address);
        assert!(client.endpoints().contains(CoreSystem::DeviceRegistry));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_server_certificate_is_not_retried() {
        let server = TlsServer::start();
        let config = config().with_port(server.port()).with_retries(3);
        let transport = Arc::new(HttpTransport::new(TransportProtocol::Https).unwrap());
        let bootstrap = OnboardingBootstrap::new(config, transport)
            .prepare()
            .await
            .unwrap();

        let err = bootstrap.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err.transport(), Some(TransportError::Tls(_))), "{err:?}");
        assert_eq!(server.connections(), 1);
        assert_eq!(bootstrap.state(), BootstrapState::Aborted);
    }

    #[tokio::test]
    async fn test_insecure_bootstrap_against_self_signed_server() {
        let (ca, leaf, key) = issued_chain();
        let server = TlsServer::serving(response(&leaf, &key, &ca).to_string());
        let config = config()
            .with_port(server.port())
            .with_insecure_ssl_context()
            .with_allow_insecure_bootstrap(true);
        let transport = Arc::new(HttpTransport::new(TransportProtocol::Https).unwrap());
        let bootstrap = OnboardingBootstrap::new(config, transport)
            .prepare()
            .await
            .unwrap();

        let client = bootstrap.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(bootstrap.state(), BootstrapState::Succeeded);
        assert_eq!(client.endpoints().len(), 5);
        assert!(client.security_context().unwrap().has_identity());
    }

    #[tokio::test]
    async fn test_unusable_issued_material_aborts() {
        let (ca, leaf, _) = issued_chain();
        let transport = StubTransport::new(
            TransportProtocol::Https,
            vec![],
            response(&leaf, "", &ca),
        );
        let bootstrap = prepare(config(), Arc::clone(&transport)).await;

        let err = bootstrap.run(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(transport.attempts(), 1);
        assert_eq!(bootstrap.state(), BootstrapState::Aborted);
    }

    #[test]
    fn test_pem_block_wraps_base64() {
        let body = "A".repeat(100);
        let block = pem_block("CERTIFICATE", &body).unwrap();
        let lines: Vec<_> = block.lines().collect();
        assert_eq!(lines[0], "-----BEGIN CERTIFICATE-----");
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 36);
        assert_eq!(lines[3], "-----END CERTIFICATE-----");

        let pem = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert_eq!(pem_block("CERTIFICATE", pem).unwrap(), pem);
        assert_eq!(pem_block("CERTIFICATE", "  ").unwrap(), "");
        assert!(pem_block("CERTIFICATE", "not base64!").unwrap_err().is_config_error());
    }
}
