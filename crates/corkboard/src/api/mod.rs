//! HTTP API module.
//!
//! Provides the REST endpoints and wires the admission pipelines in front
//! of them.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{LoginRequest, LoginResponse, UserInfo};
pub use routes::create_router;
pub use state::AppState;
