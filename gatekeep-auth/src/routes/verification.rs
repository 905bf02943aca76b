//! Password recovery plus email and phone confirmation.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use gatekeep_shared::errors::AppResult;
use gatekeep_shared::types::api::ApiResponse;
use gatekeep_shared::types::auth::AuthUser;

use crate::models::User;
use crate::services::AuthOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecoveryCodeRequest {
    pub email: Option<String>,
    pub otp: String,
    pub device_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneCodeRequest {
    #[serde(alias = "otp")]
    pub code: String,
}

pub async fn request_password_recovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecoveryRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state
        .verification
        .request_password_recovery(req.email.as_deref(), req.phone_number.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok("if the account exists, a recovery code has been sent")))
}

pub async fn validate_password_recovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecoveryCodeRequest>,
) -> AppResult<Json<ApiResponse<AuthOutcome>>> {
    let outcome = state
        .verification
        .validate_password_recovery(req.email.as_deref(), &req.otp, req.device_uuid.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

pub async fn request_email_confirmation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.verification.request_email_confirmation(user.user_id).await?;
    Ok(Json(ApiResponse::ok("confirmation email sent")))
}

pub async fn validate_email_confirmation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailTokenRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let updated = state
        .verification
        .validate_email_confirmation(user.user_id, &req.token)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

pub async fn request_phone_confirmation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.verification.request_phone_confirmation(user.user_id).await?;
    Ok(Json(ApiResponse::ok("confirmation code sent")))
}

pub async fn validate_phone_confirmation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhoneCodeRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let updated = state
        .verification
        .validate_phone_confirmation(user.user_id, &req.code)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}
