use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use gatekeep_shared::errors::AppResult;
use gatekeep_shared::types::api::ApiResponse;
use gatekeep_shared::types::auth::AuthUser;

use crate::models::{Device, DeviceChanges};
use crate::AppState;

pub async fn list(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Vec<Device>>>> {
    let devices = state.devices.list(user.user_id).await?;
    Ok(Json(ApiResponse::ok(devices)))
}

pub async fn get(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Device>>> {
    let device = state.devices.get(&user, id).await?;
    Ok(Json(ApiResponse::ok(device)))
}

/// Body: `{ "push_token"?: string, "app_version_id"?: uuid }`; `token` is
/// accepted for the push token.
pub async fn update(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(changes): Json<DeviceChanges>,
) -> AppResult<Json<ApiResponse<Device>>> {
    let device = state.devices.update(&user, id, &changes).await?;
    Ok(Json(ApiResponse::ok(device)))
}

pub async fn disable(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.devices.disable(&user, id).await?;
    Ok(Json(ApiResponse::ok("device deleted")))
}
