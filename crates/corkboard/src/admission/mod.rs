//! Network-level admission control.
//!
//! Gates that run before authentication:
//! - [`MethodGate`]: HTTP verb restriction
//! - [`AllowlistGate`]: CIDR source filtering
//! - [`RateLimiter`]: fixed-window request limits per client and tier

mod allowlist;
mod client_addr;
mod config;
mod error;
mod method;
mod rate_limit;

use std::sync::Arc;

pub use allowlist::{Allowlist, AllowlistGate, IpRange};
pub use client_addr::{ClientAddrResolver, FORWARDED_FOR, normalize};
pub use config::{AdmissionConfig, RateLimitConfig};
pub use error::AdmissionError;
pub use method::MethodGate;
pub use rate_limit::{
    KeyExtractor, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RateLimitDecision,
    RateLimitSettings, RateLimitStore, RateLimiter,
};

/// Admission gates of one deployment, built once at startup.
#[derive(Debug, Clone)]
pub struct Admission {
    pub method: Arc<MethodGate>,
    pub allowlist: Arc<AllowlistGate>,
    pub global_limiter: Arc<RateLimiter>,
    pub sensitive_limiter: Arc<RateLimiter>,
}

impl Admission {
    pub fn new(config: &AdmissionConfig, limits: &RateLimitConfig) -> Self {
        let resolver = ClientAddrResolver::new(config.trust_proxy);

        Self {
            method: Arc::new(MethodGate::for_deployment(config.cors_enabled)),
            allowlist: Arc::new(AllowlistGate::from_config(
                config.allowlist.as_deref(),
                resolver,
            )),
            global_limiter: Arc::new(RateLimiter::new("global", limits.global, resolver)),
            sensitive_limiter: Arc::new(RateLimiter::new(
                "sensitive",
                limits.sensitive,
                resolver,
            )),
        }
    }

    /// Clear the counters of every tier.
    pub fn reset_rate_limits(&self) {
        self.global_limiter.store().reset();
        self.sensitive_limiter.store().reset();
    }
}
