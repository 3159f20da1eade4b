//! HTTP request handlers.
//!
//! Handlers only see requests the route pipelines admitted. Business data
//! lives elsewhere; these endpoints report who asked and what they were
//! allowed to do.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::auth::{Account, AuthError, Identity, Role};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Account id or email.
    pub username: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Public view of an account.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&Account> for UserInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
        }
    }
}

/// Exchange credentials for a bearer token.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let account = match state
        .auth
        .validate_credentials(&request.username, &request.password)
    {
        Some(account) => account,
        None => {
            warn!(username = %request.username, "login failed");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let token = state.auth.issue_token(account)?;
    info!(user_id = %account.id, role = %account.role, "login succeeded");

    Ok(Json(LoginResponse {
        token,
        user: UserInfo::from(account),
    }))
}

/// Post listing response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    /// Caller identity; `null` for anonymous readers.
    pub viewer: Option<Identity>,
    pub posts: Vec<Post>,
}

/// Post as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub author_id: String,
    pub content: String,
}

/// List posts. Readable anonymously.
pub async fn list_posts(viewer: Option<Identity>) -> Json<PostListResponse> {
    Json(PostListResponse {
        viewer,
        posts: Vec::new(),
    })
}

/// Create post request.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

/// Create a post authored by the caller.
pub async fn create_post(
    identity: Identity,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Post content cannot be empty"));
    }

    Ok((
        StatusCode::CREATED,
        Json(Post {
            author_id: identity.subject_id,
            content: content.to_string(),
        }),
    ))
}

/// Caller's identity.
pub async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

/// Fetch a configured account.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserInfo>> {
    state
        .auth
        .accounts()
        .iter()
        .find(|account| account.id == id)
        .map(|account| Json(UserInfo::from(account)))
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))
}

/// Update profile request.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Result of a profile update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserResponse {
    pub id: String,
    pub updated_by: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Update a user profile.
pub async fn update_user(
    identity: Identity,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UpdateUserResponse>> {
    if request.name.is_none() && request.email.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    Ok(Json(UpdateUserResponse {
        id,
        updated_by: identity.subject_id,
        name: request.name,
        email: request.email,
    }))
}

/// Moderation queue response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationQueue {
    pub moderator: Identity,
    pub pending: Vec<String>,
}

/// Comments awaiting moderation.
pub async fn moderation_queue(identity: Identity) -> Json<ModerationQueue> {
    Json(ModerationQueue {
        moderator: identity,
        pending: Vec::new(),
    })
}

/// Pin result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinResponse {
    pub post_id: String,
    pub pinned: bool,
    pub pinned_by: String,
}

/// Pin a post to the top of the board.
pub async fn pin_post(identity: Identity, Path(id): Path<String>) -> Json<PinResponse> {
    info!(post_id = %id, by = %identity.subject_id, "post pinned");
    Json(PinResponse {
        post_id: id,
        pinned: true,
        pinned_by: identity.subject_id,
    })
}

/// All configured accounts.
pub async fn admin_list_users(State(state): State<AppState>) -> Json<Vec<UserInfo>> {
    Json(state.auth.accounts().iter().map(UserInfo::from).collect())
}
