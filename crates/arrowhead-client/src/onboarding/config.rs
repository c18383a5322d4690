//! Onboarding configuration.

use arrowhead_core::{CoreSystem, KeyPairPem};
use arrowhead_tls::{
    IdentityFactory, SecurityContext, TlsContextConfigurator, TlsDefaults, TrustFactory,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default onboarding controller host
pub const DEFAULT_ONBOARDING_HOST: &str = "localhost";

/// Default number of onboarding attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between onboarding attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Unit of the delay between onboarding attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    /// Milliseconds
    Millis,
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
}

impl DelayUnit {
    /// Duration of `amount` units, saturating on overflow
    #[must_use]
    pub const fn duration(&self, amount: u64) -> Duration {
        match self {
            Self::Millis => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
        }
    }
}

impl FromStr for DelayUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millis" | "milliseconds" => Ok(Self::Millis),
            "s" | "sec" | "secs" | "seconds" => Ok(Self::Seconds),
            "m" | "min" | "mins" | "minutes" => Ok(Self::Minutes),
            other => Err(format!("unknown delay unit: {other}")),
        }
    }
}

/// How often and how patiently the onboarding exchange is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts (at least one) and `delay` between them
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: NonZeroU32::new(max_attempts).unwrap_or(NonZeroU32::MIN),
            delay,
        }
    }

    /// Keep trying until the exchange succeeds or fails terminally
    #[must_use]
    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: NonZeroU32::MAX,
            delay,
        }
    }

    /// Maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Delay between attempts
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true if attempts are effectively unlimited
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.max_attempts.get() == u32::MAX
    }
}

/// Everything needed to run an onboarding bootstrap.
///
/// Built with the `with_*` methods, each of which returns an updated value.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) retry: RetryPolicy,
    pub(crate) common_name: String,
    pub(crate) key_pair: Option<KeyPairPem>,
    pub(crate) context: Option<Arc<SecurityContext>>,
    pub(crate) identity_factory: Option<IdentityFactory>,
    pub(crate) trust_factory: Option<TrustFactory>,
    pub(crate) configurator: Option<TlsContextConfigurator>,
    pub(crate) defaults: TlsDefaults,
    pub(crate) strict: bool,
    pub(crate) insecure: bool,
    pub(crate) allow_insecure: bool,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ONBOARDING_HOST.to_string(),
            port: CoreSystem::Onboarding.default_port(),
            retry: RetryPolicy::default(),
            common_name: String::new(),
            key_pair: None,
            context: None,
            identity_factory: None,
            trust_factory: None,
            configurator: None,
            defaults: TlsDefaults::default(),
            strict: true,
            insecure: false,
            allow_insecure: false,
        }
    }
}

impl OnboardingConfig {
    /// Configuration for a device called `common_name`
    #[must_use]
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Onboarding controller host name or address
    #[must_use]
    pub fn with_onboarding_address(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Onboarding controller port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Number of attempts; zero is treated as one
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry = RetryPolicy::new(retries, self.retry.delay());
        self
    }

    /// Retry until the exchange succeeds, fails terminally or is cancelled
    #[must_use]
    pub const fn with_maximum_retries(mut self) -> Self {
        self.retry = RetryPolicy::unbounded(self.retry.delay());
        self
    }

    /// Delay between attempts
    #[must_use]
    pub const fn with_delay(mut self, amount: u64, unit: DelayUnit) -> Self {
        self.retry.delay = unit.duration(amount);
        self
    }

    /// Replace the whole retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Key pair to have certified instead of letting the controller generate one
    #[must_use]
    pub fn with_key_pair(mut self, key_pair: KeyPairPem) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Use this security context; takes precedence over all other TLS material
    #[must_use]
    pub fn with_security_context(mut self, context: Arc<SecurityContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Use these factories unless a security context is given
    #[must_use]
    pub fn with_factories(
        mut self,
        identity: Option<IdentityFactory>,
        trust: Option<TrustFactory>,
    ) -> Self {
        self.identity_factory = identity;
        self.trust_factory = trust;
        self
    }

    /// Use this configurator unless a context or factories are given
    #[must_use]
    pub fn with_configurator(mut self, configurator: TlsContextConfigurator) -> Self {
        self.configurator = Some(configurator);
        self
    }

    /// Defaults for the configurator built when no TLS material is given
    #[must_use]
    pub fn with_tls_defaults(mut self, defaults: TlsDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Fail on TLS material errors (default) or continue with what loaded
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Onboard with a context that trusts every server.
    ///
    /// Has no effect on plain HTTP. Preparing fails unless
    /// [`Self::with_allow_insecure_bootstrap`] is also set.
    #[must_use]
    pub const fn with_insecure_ssl_context(mut self) -> Self {
        self.insecure = true;
        self
    }

    /// Permit [`Self::with_insecure_ssl_context`]
    #[must_use]
    pub const fn with_allow_insecure_bootstrap(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Controller host
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Controller port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Retry policy
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Common name requested for the device certificate
    #[must_use]
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Returns true if insecure onboarding was requested
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        self.insecure
    }
}

impl std::fmt::Display for OnboardingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OnboardingConfig [address='{}:{}', retries={}, delay={:?}]",
            self.host,
            self.port,
            self.retry.max_attempts(),
            self.retry.delay()
        )
    }
}
