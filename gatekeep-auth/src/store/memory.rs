use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gatekeep_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{CodeKind, Device, DeviceChanges, Session, User, UserChanges, VerificationRecord};

use super::{DeviceStore, SessionStore, UserStore, VerificationStore};

/// In-process implementation of every store, with the same unique indexes
/// and conditional writes as the Postgres and Redis adapters.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    devices: Mutex<HashMap<String, Device>>,
    codes: Mutex<HashMap<(Uuid, CodeKind), VerificationRecord>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn device_count(&self) -> usize {
        lock(&self.devices).len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: &User) -> AppResult<()> {
        let mut users = lock(&self.users);
        if users.values().any(|u| u.username == user.username) {
            return Err(AppError::new(ErrorCode::UsernameTaken, "username already taken"));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(lock(&self.users).values().find(|u| u.username == username).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(lock(&self.users).values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> AppResult<Option<User>> {
        let mut users = lock(&self.users);
        Ok(users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.clone()
        }))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &Session) -> AppResult<()> {
        let mut sessions = lock(&self.sessions);
        if sessions.values().any(|s| s.refresh_token_hash == session.refresh_token_hash) {
            return Err(AppError::conflict("refresh token collision"));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(lock(&self.sessions).get(&id).cloned())
    }

    async fn get_by_refresh_hash(&self, hash: &str) -> AppResult<Option<Session>> {
        Ok(lock(&self.sessions)
            .values()
            .find(|s| s.refresh_token_hash == hash)
            .cloned())
    }

    async fn rotate_refresh(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(&id) {
            Some(s) if s.enabled && s.refresh_token_hash == old_hash => {
                s.refresh_token_hash = new_hash.to_owned();
                s.refresh_expires_at = expires_at;
                s.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn disable(&self, id: Uuid) -> AppResult<bool> {
        let mut sessions = lock(&self.sessions);
        Ok(sessions
            .get_mut(&id)
            .map(|s| {
                s.enabled = false;
                s.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn disable_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        let mut sessions = lock(&self.sessions);
        let mut count = 0;
        for s in sessions.values_mut().filter(|s| s.user_id == user_id && s.enabled) {
            s.enabled = false;
            s.updated_at = Utc::now();
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get_by_uuid(&self, device_uuid: &str) -> AppResult<Option<Device>> {
        Ok(lock(&self.devices).get(device_uuid).cloned())
    }

    async fn create(&self, device: &Device) -> AppResult<()> {
        let mut devices = lock(&self.devices);
        if devices.contains_key(&device.device_uuid) {
            return Err(AppError::conflict("device already registered"));
        }
        devices.insert(device.device_uuid.clone(), device.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Device>> {
        Ok(lock(&self.devices).values().find(|d| d.id == id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        let mut found: Vec<Device> = lock(&self.devices)
            .values()
            .filter(|d| d.user_id == user_id && d.enabled)
            .cloned()
            .collect();
        found.sort_by_key(|d| d.created_at);
        Ok(found)
    }

    async fn update(&self, id: Uuid, changes: &DeviceChanges) -> AppResult<Option<Device>> {
        let mut devices = lock(&self.devices);
        Ok(devices.values_mut().find(|d| d.id == id && d.enabled).map(|device| {
            changes.apply(device);
            device.clone()
        }))
    }

    async fn disable(&self, id: Uuid) -> AppResult<bool> {
        let mut devices = lock(&self.devices);
        Ok(devices
            .values_mut()
            .find(|d| d.id == id && d.enabled)
            .map(|d| {
                d.enabled = false;
                d.updated_at = Utc::now();
            })
            .is_some())
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn put(&self, record: &VerificationRecord) -> AppResult<()> {
        lock(&self.codes).insert((record.user_id, record.kind), record.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid, kind: CodeKind) -> AppResult<Option<VerificationRecord>> {
        let mut codes = lock(&self.codes);
        // store-side expiry, as Redis would do
        if codes.get(&(user_id, kind)).is_some_and(|r| r.is_expired(Utc::now())) {
            codes.remove(&(user_id, kind));
        }
        Ok(codes.get(&(user_id, kind)).cloned())
    }

    async fn delete_if_matches(&self, user_id: Uuid, kind: CodeKind, code: &str) -> AppResult<bool> {
        let mut codes = lock(&self.codes);
        if codes.get(&(user_id, kind)).is_some_and(|r| r.code == code) {
            codes.remove(&(user_id, kind));
            return Ok(true);
        }
        Ok(false)
    }
}
