//! Authentication and authorization errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use super::TokenError;

/// Authentication and authorization errors.
///
/// The display string of each variant is the `message` clients receive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing authorization header.
    #[error("Authentication required")]
    MissingCredentials,

    /// Authorization header does not use the bearer scheme.
    #[error("Invalid authorization format. Use: Bearer <token>")]
    InvalidScheme,

    /// Token failed to decode or verify.
    #[error("Invalid token")]
    InvalidToken,

    /// Token expired.
    #[error("Token has expired")]
    TokenExpired,

    /// Token is signed but lacks a subject or role.
    #[error("Invalid token payload")]
    InvalidPayload,

    /// Token carries a role outside the role enumeration.
    #[error("Invalid user role")]
    InvalidRole,

    /// Login with an unknown user or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authenticated but not allowed to perform the action.
    #[error("{0}")]
    Forbidden(String),

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_) => AuthError::InvalidToken,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::InvalidPayload => AuthError::InvalidPayload,
            TokenError::InvalidRole(_) => AuthError::InvalidRole,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AuthError::Internal(detail) => {
                log::error!("auth internal error: {}", detail);
                "Authentication failed".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(AuthErrorResponse {
            error: status.canonical_reason().unwrap_or("Error"),
            message,
        });

        (status, body).into_response()
    }
}
