//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response, header},
};
use corkboard::admission::RateLimitSettings;
use corkboard::api::{self, AppState};
use corkboard::auth::{Account, Role, TokenCodec};
use corkboard::config::AppConfig;
use serde_json::Value;

pub const SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
pub const PASSWORD: &str = "password123";

fn make_account(id: &str, name: &str, role: Role) -> Account {
    let password_hash = bcrypt::hash(PASSWORD, 4).expect("Failed to hash password");

    Account {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@corkboard.test"),
        password_hash,
        role,
    }
}

/// Configuration with one account per role and generous limits.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());
    config.auth.users = vec![
        make_account("user123", "Sam Student", Role::Student),
        make_account("teach1", "Tara Teacher", Role::Teacher),
        make_account("root", "Ada Admin", Role::Admin),
    ];
    config.rate_limit.global = RateLimitSettings {
        window_ms: 60_000,
        max: 1_000,
    };
    config.rate_limit.sensitive = RateLimitSettings {
        window_ms: 60_000,
        max: 100,
    };
    config
}

pub fn test_state(config: &AppConfig) -> AppState {
    AppState::from_config(config).expect("valid test config")
}

/// Application router built from `config`.
pub fn app_with(config: &AppConfig) -> Router {
    api::create_router(test_state(config))
}

pub fn test_app() -> Router {
    app_with(&test_config())
}

/// Codec sharing the test secret.
pub fn codec() -> TokenCodec {
    TokenCodec::new(SECRET, 3600)
}

pub fn token(subject: &str, role: Role) -> String {
    codec().issue(subject, role).expect("sign test token")
}

pub fn peer(addr: &str) -> ConnectInfo<SocketAddr> {
    ConnectInfo(addr.parse().expect("valid socket address"))
}

/// Request builder with an optional bearer token.
pub fn request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, bearer)
}

pub fn post_json(uri: &str, bearer: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
