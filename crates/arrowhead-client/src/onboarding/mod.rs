//! Secure onboarding of an unprovisioned device.

mod bootstrap;
mod config;

pub use bootstrap::{BootstrapState, OnboardedClient, OnboardingBootstrap, PreparedBootstrap};
pub use config::{
    DelayUnit, OnboardingConfig, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_ONBOARDING_HOST,
    DEFAULT_RETRY_DELAY,
};
