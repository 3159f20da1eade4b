//! Application state shared across handlers.

use anyhow::{Context, Result};

use crate::admission::{Admission, AdmissionConfig};
use crate::auth::AuthState;
use crate::config::AppConfig;

/// State shared by the router, the admission stages and the handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Token codec and configured accounts.
    pub auth: AuthState,
    /// Method gate, allowlist and rate limiters.
    pub admission: Admission,
    /// Admission settings the router needs at build time (CORS).
    pub admission_config: AdmissionConfig,
}

impl AppState {
    pub fn new(auth: AuthState, admission: Admission, admission_config: AdmissionConfig) -> Self {
        Self {
            auth,
            admission,
            admission_config,
        }
    }

    /// Build the state from a loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let auth = AuthState::new(config.auth.clone()).context("invalid auth configuration")?;
        config
            .rate_limit
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid rate limit configuration")?;
        let admission = Admission::new(&config.admission, &config.rate_limit);

        Ok(Self::new(auth, admission, config.admission.clone()))
    }
}
