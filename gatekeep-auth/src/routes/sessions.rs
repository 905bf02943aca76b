use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use gatekeep_shared::errors::AppResult;
use gatekeep_shared::types::api::ApiResponse;
use gatekeep_shared::types::auth::{AuthUser, TokenPair};

use crate::models::SessionWithUser;
use crate::services::AuthOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    pub password: String,
    pub device_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    #[serde(alias = "id_token")]
    pub credential: String,
    pub device_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthOutcome>>> {
    let outcome = state
        .sessions
        .login(&req.username, &req.password, req.device_uuid.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn google(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleLoginRequest>,
) -> AppResult<Json<ApiResponse<AuthOutcome>>> {
    let outcome = state
        .oauth
        .login_with_google(&req.credential, req.device_uuid.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let tokens = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

pub async fn current(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SessionWithUser>>> {
    let session = state.sessions.current(user.session_id).await?;
    Ok(Json(ApiResponse::ok(session)))
}

pub async fn logout(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.sessions.logout(user.session_id).await?;
    Ok(Json(ApiResponse::ok("logged out")))
}
