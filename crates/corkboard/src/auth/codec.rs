//! Bearer token signing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use super::{ClaimSet, Claims, Role};

/// Token codec failures, in the order verification checks for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Bad signature, wrong algorithm or not a JWT at all.
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    /// Signature is fine but a required claim is missing.
    #[error("token payload is missing required claims")]
    InvalidPayload,

    /// Signature is fine but the role is outside the role enumeration.
    #[error("token role is not recognised: {0}")]
    InvalidRole(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// HS256 token codec.
///
/// Verification is a pure function of the token, the secret and the current
/// time; nothing is cached between calls.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `verify_at` so that a well-signed but expired
        // token is reported as such and no leeway is applied.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
            validation,
        }
    }

    /// Token lifetime applied by [`TokenCodec::issue`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject_id` expiring after the configured lifetime.
    pub fn issue(&self, subject_id: &str, role: Role) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims::new(
            subject_id,
            role,
            now.timestamp(),
            (now + self.ttl).timestamp(),
        );
        self.sign(&claims)
    }

    /// Sign an arbitrary payload. Nothing about the payload is checked.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<ClaimSet, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// Checks run in a fixed order: signature and structure, expiry,
    /// required claims, role membership.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<ClaimSet, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?
            .claims;

        if claims.exp.is_some_and(|exp| exp <= now.timestamp()) {
            return Err(TokenError::Expired);
        }

        let subject_id = claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(TokenError::InvalidPayload)?;
        let role = claims
            .role
            .filter(|role| !role.is_null() && role.as_str() != Some(""))
            .ok_or(TokenError::InvalidPayload)?;
        let expires_at = claims
            .exp
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
            .ok_or(TokenError::InvalidPayload)?;
        let issued_at = claims.iat.and_then(|iat| DateTime::from_timestamp(iat, 0));

        let role = match role.as_str() {
            Some(name) => name
                .parse::<Role>()
                .map_err(|_| TokenError::InvalidRole(name.to_string()))?,
            None => return Err(TokenError::InvalidRole(role.to_string())),
        };

        Ok(ClaimSet {
            subject_id,
            role,
            issued_at,
            expires_at,
        })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
