//! API route definitions.
//!
//! Every request first passes the global pipeline (method gate, then the
//! global rate limit). Route groups add their own stages through
//! `route_layer`, so they only run for requests that matched a route.

use axum::http::{HeaderValue, header};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::admission::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
use crate::auth::{Role, RoleGuard};
use crate::pipeline::{Pipeline, admit};

use super::error::ApiError;
use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Tracing layer with request IDs and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let admission = &state.admission;
    let auth = &state.auth;

    let global = Pipeline::new()
        .shared(admission.method.clone())
        .shared(admission.global_limiter.clone());

    // Public routes
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().shared(admission.sensitive_limiter.clone()),
            admit,
        ))
        .with_state(state.clone());

    let reader_routes = Router::new()
        .route("/api/posts", get(handlers::list_posts))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().stage(auth.optional_authenticator()),
            admit,
        ))
        .with_state(state.clone());

    // Protected routes (require authentication)
    let member_routes = Router::new()
        .route("/api/posts", post(handlers::create_post))
        .route("/api/me", get(handlers::me))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new().stage(auth.authenticator()),
            admit,
        ))
        .with_state(state.clone());

    let owner_routes = Router::new()
        .route(
            "/api/users/{id}",
            get(handlers::get_user).post(handlers::update_user),
        )
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new()
                .stage(auth.authenticator())
                .stage(RoleGuard::require_ownership("id")),
            admit,
        ))
        .with_state(state.clone());

    let moderation_routes = Router::new()
        .route("/api/comments/moderation", get(handlers::moderation_queue))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new()
                .stage(auth.authenticator())
                .stage(RoleGuard::require_min_role(Role::Teacher)),
            admit,
        ))
        .with_state(state.clone());

    let pin_routes = Router::new()
        .route("/api/posts/{id}/pin", post(handlers::pin_post))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new()
                .stage(auth.authenticator())
                .stage(RoleGuard::require_teacher_or_admin()),
            admit,
        ))
        .with_state(state.clone());

    // Admin routes (network allowlist, then admin role)
    let admin_routes = Router::new()
        .route("/api/admin/users", get(handlers::admin_list_users))
        .route_layer(middleware::from_fn_with_state(
            Pipeline::new()
                .shared(admission.allowlist.clone())
                .stage(auth.authenticator())
                .stage(RoleGuard::require_admin()),
            admit,
        ))
        .with_state(state.clone());

    let mut router = Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(reader_routes)
        .merge(member_routes)
        .merge(owner_routes)
        .merge(moderation_routes)
        .merge(pin_routes)
        .merge(admin_routes)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(global, admit));

    if state.admission_config.cors_enabled {
        router = router.layer(build_cors_layer(&state));
    }

    router.layer(trace_layer)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Build the CORS layer from the configured origins.
///
/// With no configured origins every cross-origin request is denied.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins = &state.admission_config.allowed_origins;
    let methods = state.admission.method.allowed().to_vec();

    // Define allowed headers
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    let exposed = [
        RATE_LIMIT_LIMIT,
        RATE_LIMIT_REMAINING,
        RATE_LIMIT_RESET,
        header::RETRY_AFTER,
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, denying all cross-origin requests");
        return CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
            .allow_methods(methods);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(exposed)
        .allow_credentials(true)
}
