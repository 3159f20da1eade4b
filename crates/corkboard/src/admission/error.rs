//! Network-level admission errors.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use super::rate_limit::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, reset_secs};

/// Admission errors raised before authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Source address is not on the allowlist. Deliberately generic.
    #[error("Forbidden")]
    AddressDenied,

    /// Request method is outside the allowed set.
    #[error("method {method} is not allowed")]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },

    /// Rate limit exceeded.
    #[error("Too many requests, please try again later.")]
    RateLimited {
        tier: &'static str,
        limit: u32,
        reset_after: Duration,
    },
}

#[derive(Debug, Serialize)]
struct MessageBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MethodNotAllowedBody {
    error: &'static str,
    allowed_methods: Vec<String>,
}

impl AdmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AddressDenied => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let reason = status.canonical_reason().unwrap_or("Error");
        let message = self.to_string();

        match self {
            Self::AddressDenied => (
                status,
                Json(MessageBody {
                    error: reason,
                    message,
                }),
            )
                .into_response(),
            Self::MethodNotAllowed { allowed, .. } => {
                let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&names.join(", ")) {
                    headers.insert(header::ALLOW, value);
                }
                (
                    status,
                    headers,
                    Json(MethodNotAllowedBody {
                        error: reason,
                        allowed_methods: names,
                    }),
                )
                    .into_response()
            }
            Self::RateLimited {
                limit, reset_after, ..
            } => {
                let reset = reset_secs(reset_after);
                let mut headers = HeaderMap::new();
                headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
                headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset));
                headers.insert(header::RETRY_AFTER, HeaderValue::from(reset));
                (
                    status,
                    headers,
                    Json(MessageBody {
                        error: reason,
                        message,
                    }),
                )
                    .into_response()
            }
        }
    }
}
