use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use gatekeep_shared::errors::AppResult;
use gatekeep_shared::middleware::AdminUser;
use gatekeep_shared::types::api::ApiResponse;
use gatekeep_shared::types::auth::AuthUser;

use crate::services::user_service::RegisterRequest;
use crate::services::AuthOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub new_password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<AuthOutcome>>> {
    let outcome = state.users.register_with_session(req).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn change_password(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.users.change_password(user.user_id, &req.new_password).await?;
    Ok(Json(ApiResponse::ok("password changed")))
}

pub async fn disable(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.users.disable_account(user_id).await?;
    tracing::info!(admin_id = %admin.user_id, user_id = %user_id, "account disabled by admin");
    Ok(Json(ApiResponse::ok("account disabled")))
}
