//! Admission configuration.

use serde::{Deserialize, Serialize};

use super::RateLimitSettings;

/// Network-level admission settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Comma-separated CIDR ranges allowed to reach the admin routes.
    /// Unset disables the allowlist.
    pub allowlist: Option<String>,

    /// Take the client address from `X-Forwarded-For` instead of the peer.
    pub trust_proxy: bool,

    /// Enable cross-origin requests (and with them the OPTIONS method).
    pub cors_enabled: bool,

    /// Origins allowed when `cors_enabled` is set.
    pub allowed_origins: Vec<String>,
}

/// Rate limit tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Applied to every request.
    pub global: RateLimitSettings,
    /// Applied on top of `global` to login and similar endpoints.
    pub sensitive: RateLimitSettings,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: RateLimitSettings {
                window_ms: 15 * 60 * 1000,
                max: 200,
            },
            sensitive: RateLimitSettings {
                window_ms: 15 * 60 * 1000,
                max: 10,
            },
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (tier, settings) in [("global", &self.global), ("sensitive", &self.sensitive)] {
            if settings.window_ms == 0 {
                return Err(format!("rate_limit.{tier}.window_ms must be positive"));
            }
            if settings.max == 0 {
                return Err(format!("rate_limit.{tier}.max must be positive"));
            }
        }
        Ok(())
    }
}
