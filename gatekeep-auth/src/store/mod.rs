//! Persistence boundaries. `Ok(None)` always means "not found"; every other
//! failure is an `Err` and is never reinterpreted by callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gatekeep_shared::errors::AppResult;

use crate::models::{CodeKind, Device, DeviceChanges, Session, User, UserChanges, VerificationRecord};

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use redis::RedisVerificationStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `UsernameTaken` / `EmailAlreadyExists` on a unique clash.
    async fn create(&self, user: &User) -> AppResult<()>;
    async fn get(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// Returns the updated row, `None` if the user does not exist.
    async fn update(&self, id: Uuid, changes: &UserChanges) -> AppResult<Option<User>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> AppResult<()>;
    async fn get(&self, id: Uuid) -> AppResult<Option<Session>>;
    async fn get_by_refresh_hash(&self, hash: &str) -> AppResult<Option<Session>>;
    /// Replaces the refresh secret only while the session is enabled and
    /// still holds `old_hash`. `false` means another caller got there first.
    async fn rotate_refresh(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// Returns whether a session row was found.
    async fn disable(&self, id: Uuid) -> AppResult<bool>;
    /// Returns how many sessions were switched off.
    async fn disable_for_user(&self, user_id: Uuid) -> AppResult<usize>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get_by_uuid(&self, device_uuid: &str) -> AppResult<Option<Device>>;
    /// Fails with `Conflict` if the UUID is already registered.
    async fn create(&self, device: &Device) -> AppResult<()>;
    async fn get(&self, id: Uuid) -> AppResult<Option<Device>>;
    /// Enabled devices of the user, oldest first.
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Device>>;
    /// Applies `changes` to an enabled device. `None` if there is none.
    async fn update(&self, id: Uuid, changes: &DeviceChanges) -> AppResult<Option<Device>>;
    /// Soft delete. Returns whether an enabled device was switched off.
    async fn disable(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Replaces any pending record of the same kind for the user.
    async fn put(&self, record: &VerificationRecord) -> AppResult<()>;
    async fn get(&self, user_id: Uuid, kind: CodeKind) -> AppResult<Option<VerificationRecord>>;
    /// Deletes the record only if it still holds `code`. Returns whether this
    /// call consumed it.
    async fn delete_if_matches(&self, user_id: Uuid, kind: CodeKind, code: &str) -> AppResult<bool>;

    /// Readiness check for the backing service.
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
