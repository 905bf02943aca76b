use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gatekeep_shared::types::auth::{AuthProvider, UserRole};

use crate::schema::{devices, sessions, users};

// --- Users ---

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub birthday: Option<NaiveDate>,
    pub verified: bool,
    pub email_confirmed: bool,
    pub phone_confirmed: bool,
    pub auth_provider: String,
    #[serde(skip_serializing)]
    pub external_subject: Option<String>,
    pub enabled: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh enabled account with role `user` and no confirmed channels.
    pub fn new(username: impl Into<String>, email: impl Into<String>, provider: AuthProvider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            email: email.into(),
            phone: None,
            password_hash: None,
            role: UserRole::User.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            birthday: None,
            verified: false,
            email_confirmed: false,
            phone_confirmed: false,
            auth_provider: provider.to_string(),
            external_subject: None,
            enabled: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Unknown role strings degrade to the least privileged role.
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::User)
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Partial update of a user. `None` leaves the column untouched.
#[derive(Debug, Default, Clone, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub verified: Option<bool>,
    pub email_confirmed: Option<bool>,
    pub phone_confirmed: Option<bool>,
    pub auth_provider: Option<String>,
    pub external_subject: Option<String>,
    pub enabled: Option<bool>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserChanges {
    pub fn apply(&self, user: &mut User) {
        if let Some(v) = &self.phone {
            user.phone = Some(v.clone());
        }
        if let Some(v) = &self.password_hash {
            user.password_hash = Some(v.clone());
        }
        if let Some(v) = self.verified {
            user.verified = v;
        }
        if let Some(v) = self.email_confirmed {
            user.email_confirmed = v;
        }
        if let Some(v) = self.phone_confirmed {
            user.phone_confirmed = v;
        }
        if let Some(v) = &self.auth_provider {
            user.auth_provider = v.clone();
        }
        if let Some(v) = &self.external_subject {
            user.external_subject = Some(v.clone());
        }
        if let Some(v) = self.enabled {
            user.enabled = v;
        }
        if let Some(v) = self.deleted_at {
            user.deleted_at = Some(v);
        }
        user.updated_at = Utc::now();
    }
}

// --- Sessions ---

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_refreshable(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.refresh_expires_at > now
    }
}

/// A session with the current snapshot of its owner.
#[derive(Debug, Clone, Serialize)]
pub struct SessionWithUser {
    #[serde(flatten)]
    pub session: Session,
    pub user: User,
}

// --- Devices ---

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = devices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Device {
    pub id: Uuid,
    pub device_uuid: String,
    pub user_id: Uuid,
    pub push_token: Option<String>,
    pub app_version_id: Option<Uuid>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-writable device fields. `None` leaves the column untouched.
#[derive(Debug, Default, Clone, Deserialize, AsChangeset)]
#[diesel(table_name = devices)]
pub struct DeviceChanges {
    #[serde(alias = "token")]
    pub push_token: Option<String>,
    pub app_version_id: Option<Uuid>,
}

impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.push_token.is_none() && self.app_version_id.is_none()
    }

    pub fn apply(&self, device: &mut Device) {
        if let Some(v) = &self.push_token {
            device.push_token = Some(v.clone());
        }
        if let Some(v) = self.app_version_id {
            device.app_version_id = Some(v);
        }
        device.updated_at = Utc::now();
    }
}

// --- Verification codes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    PasswordRecovery,
    EmailConfirm,
    PhoneConfirm,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::PasswordRecovery => "password_recovery",
            CodeKind::EmailConfirm => "email_confirm",
            CodeKind::PhoneConfirm => "phone_confirm",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            CodeKind::PasswordRecovery | CodeKind::PhoneConfirm => Duration::minutes(15),
            CodeKind::EmailConfirm => Duration::hours(24),
        }
    }
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one pending code of a kind for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub user_id: Uuid,
    pub kind: CodeKind,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
