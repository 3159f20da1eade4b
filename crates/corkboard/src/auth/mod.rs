//! Authentication and authorization.
//!
//! Provides:
//! - HS256 bearer token issuing and verification
//! - Required and optional authentication stages
//! - Role guards: exact role set, minimum role, resource ownership

mod claims;
mod codec;
mod config;
mod error;
mod guard;
mod middleware;

pub use claims::{ClaimSet, Claims, Role};
pub use codec::{TokenCodec, TokenError};
pub use config::{Account, AuthConfig, ConfigValidationError};
pub use error::{AuthError, AuthErrorResponse};
pub use guard::RoleGuard;
pub use middleware::{AuthMode, AuthState, Authenticator, Identity};
