//! Authentication stage and identity extraction.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{Request, header::AUTHORIZATION, request::Parts},
};
use log::{debug, warn};
use serde::Serialize;

use super::{Account, AuthConfig, AuthError, ConfigValidationError, Role, TokenCodec};
use crate::pipeline::{Admitted, Rejection, Stage};

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidScheme)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidScheme);
    }

    let token = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token)
}

/// Authenticated identity attached to a request.
///
/// Handlers take it as an extractor; `Option<Identity>` yields `None` for
/// anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub subject_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>, role: Role) -> Self {
        Self {
            subject_id: subject_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

impl<S> OptionalFromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned())
    }
}

/// Whether authentication failure rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Required,
    /// Failures leave the request anonymous.
    Optional,
}

/// Verifies the bearer token and attaches an [`Identity`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    codec: Arc<TokenCodec>,
    mode: AuthMode,
}

impl Authenticator {
    pub fn required(codec: Arc<TokenCodec>) -> Self {
        Self {
            codec,
            mode: AuthMode::Required,
        }
    }

    pub fn optional(codec: Arc<TokenCodec>) -> Self {
        Self {
            codec,
            mode: AuthMode::Optional,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Resolve the identity carried by `req`. Every call verifies the token
    /// from scratch.
    pub fn authenticate(&self, req: &Request<Body>) -> Result<Identity, AuthError> {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::InvalidScheme)?;

        let token = bearer_token_from_header(header)?;
        let claims = self.codec.verify(token)?;

        Ok(Identity {
            subject_id: claims.subject_id,
            role: claims.role,
        })
    }
}

impl Stage for Authenticator {
    fn name(&self) -> &'static str {
        match self.mode {
            AuthMode::Required => "authenticate",
            AuthMode::Optional => "authenticate_optional",
        }
    }

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection> {
        // Never trust an identity that did not come from this verification.
        req.extensions_mut().remove::<Identity>();

        match self.authenticate(req) {
            Ok(identity) => {
                debug!(
                    "authenticated {} as {}",
                    identity.subject_id, identity.role
                );
                req.extensions_mut().insert(identity);
                Ok(Admitted::pass())
            }
            Err(err) if self.mode == AuthMode::Optional => {
                debug!("continuing anonymously: {}", err);
                Ok(Admitted::pass())
            }
            Err(err) => {
                if matches!(err, AuthError::InvalidRole | AuthError::InvalidPayload) {
                    warn!("signed token rejected: {}", err);
                }
                Err(err.into())
            }
        }
    }
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    codec: Arc<TokenCodec>,
}

impl AuthState {
    /// Create new auth state from config, resolving and validating the secret.
    pub fn new(config: AuthConfig) -> Result<Self, ConfigValidationError> {
        let secret = config.validate()?;
        let codec = Arc::new(TokenCodec::new(&secret, config.token_ttl_secs));

        Ok(Self {
            config: Arc::new(config),
            codec,
        })
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Stage rejecting requests without a valid token.
    pub fn authenticator(&self) -> Authenticator {
        Authenticator::required(self.codec.clone())
    }

    /// Stage attaching an identity when a valid token is present.
    pub fn optional_authenticator(&self) -> Authenticator {
        Authenticator::optional(self.codec.clone())
    }

    pub fn accounts(&self) -> &[Account] {
        &self.config.users
    }

    /// Find the account matching `username` (id or email) and `password`.
    pub fn validate_credentials(&self, username: &str, password: &str) -> Option<&Account> {
        self.config
            .users
            .iter()
            .find(|u| (u.id == username || u.email == username) && u.verify_password(password))
    }

    /// Issue a token for an account.
    pub fn issue_token(&self, account: &Account) -> Result<String, AuthError> {
        Ok(self.codec.issue(&account.id, account.role)?)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("accounts", &self.config.users.len())
            .field("codec", &self.codec)
            .finish()
    }
}
