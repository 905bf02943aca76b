use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use gatekeep_shared::errors::{AppError, AppResult, ErrorCode};
use gatekeep_shared::types::auth::AuthProvider;

use crate::models::{User, UserChanges};
use crate::services::password;
use crate::services::session_service::{AuthOutcome, SessionService};
use crate::store::{SessionStore, UserStore};

fn username_chars(username: &str) -> Result<(), ValidationError> {
    if username.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 64), custom = "username_chars")]
    pub username: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 6, max = 32))]
    pub phone: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub device_uuid: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    session_store: Arc<dyn SessionStore>,
    sessions: SessionService,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, session_store: Arc<dyn SessionStore>, sessions: SessionService) -> Self {
        Self {
            users,
            session_store,
            sessions,
        }
    }

    /// Creates a local account and signs it in on the requesting device.
    pub async fn register_with_session(&self, req: RegisterRequest) -> AppResult<AuthOutcome> {
        req.validate().map_err(|e| {
            let fields = serde_json::to_value(e.field_errors()).unwrap_or_default();
            AppError::with_details(ErrorCode::ValidationError, "validation failed", fields)
        })?;
        password::validate_password(&req.password)?;

        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();

        if self.users.get_by_username(&username).await?.is_some() {
            return Err(AppError::new(ErrorCode::UsernameTaken, "username already taken"));
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
        }

        let mut user = User::new(username, email, AuthProvider::Local);
        user.password_hash = Some(password::hash_password(&req.password)?);
        user.first_name = req.first_name;
        user.last_name = req.last_name;
        user.phone = req.phone.filter(|p| !p.is_empty());
        user.birthday = req.birthday;
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        self.sessions.issue(user, req.device_uuid.as_deref()).await
    }

    pub async fn change_password(&self, user_id: Uuid, new_password: &str) -> AppResult<()> {
        password::validate_password(new_password)?;
        let changes = UserChanges {
            password_hash: Some(password::hash_password(new_password)?),
            ..Default::default()
        };
        self.users
            .update(user_id, &changes)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Soft-deletes the account, then switches its sessions off. The session
    /// cascade is best-effort.
    pub async fn disable_account(&self, user_id: Uuid) -> AppResult<()> {
        let changes = UserChanges {
            enabled: Some(false),
            deleted_at: Some(Utc::now()),
            ..Default::default()
        };
        self.users
            .update(user_id, &changes)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;

        match self.session_store.disable_for_user(user_id).await {
            Ok(count) => tracing::info!(user_id = %user_id, sessions = count, "account disabled"),
            Err(e) => tracing::warn!(user_id = %user_id, error = ?e, "account disabled but sessions were not revoked"),
        }
        Ok(())
    }
}
