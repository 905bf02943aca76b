use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use gatekeep_shared::clients::db::DbPool;
use gatekeep_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Device, DeviceChanges, Session, User, UserChanges};
use crate::schema::{devices, sessions, users};

use super::{DeviceStore, SessionStore, UserStore};

/// Identity, session and device tables on Postgres. Diesel is synchronous,
/// so each call runs on the blocking pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().context("database pool checkout")?;
            f(&mut conn)
        })
        .await
        .context("database task failed")?
    }
}

/// Maps unique-index violations to domain conflicts, by constraint name.
fn map_unique(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            let constraint = info.constraint_name().unwrap_or_default();
            if constraint.contains("username") {
                AppError::new(ErrorCode::UsernameTaken, "username already taken")
            } else if constraint.contains("email") {
                AppError::new(ErrorCode::EmailAlreadyExists, "email already registered")
            } else {
                AppError::conflict("resource already exists")
            }
        }
        other => AppError::Database(other),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: &User) -> AppResult<()> {
        let user = user.clone();
        self.run(move |conn| {
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .map_err(map_unique)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<User>> {
        self.run(move |conn| {
            Ok(users::table
                .find(id)
                .select(User::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let username = username.to_owned();
        self.run(move |conn| {
            Ok(users::table
                .filter(users::username.eq(username))
                .select(User::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_owned();
        self.run(move |conn| {
            Ok(users::table
                .filter(users::email.eq(email))
                .select(User::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> AppResult<Option<User>> {
        let changes = changes.clone();
        self.run(move |conn| {
            Ok(diesel::update(users::table.find(id))
                .set((&changes, users::updated_at.eq(Utc::now())))
                .returning(User::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_unique)?)
        })
        .await
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, session: &Session) -> AppResult<()> {
        let session = session.clone();
        self.run(move |conn| {
            diesel::insert_into(sessions::table)
                .values(&session)
                .execute(conn)
                .map_err(map_unique)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Session>> {
        self.run(move |conn| {
            Ok(sessions::table
                .find(id)
                .select(Session::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn get_by_refresh_hash(&self, hash: &str) -> AppResult<Option<Session>> {
        let hash = hash.to_owned();
        self.run(move |conn| {
            Ok(sessions::table
                .filter(sessions::refresh_token_hash.eq(hash))
                .select(Session::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn rotate_refresh(
        &self,
        id: Uuid,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let old_hash = old_hash.to_owned();
        let new_hash = new_hash.to_owned();
        self.run(move |conn| {
            let updated = diesel::update(
                sessions::table
                    .filter(sessions::id.eq(id))
                    .filter(sessions::refresh_token_hash.eq(old_hash))
                    .filter(sessions::enabled.eq(true)),
            )
            .set((
                sessions::refresh_token_hash.eq(new_hash),
                sessions::refresh_expires_at.eq(expires_at),
                sessions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn disable(&self, id: Uuid) -> AppResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(sessions::table.find(id))
                .set((sessions::enabled.eq(false), sessions::updated_at.eq(Utc::now())))
                .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn disable_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        self.run(move |conn| {
            Ok(diesel::update(
                sessions::table
                    .filter(sessions::user_id.eq(user_id))
                    .filter(sessions::enabled.eq(true)),
            )
            .set((sessions::enabled.eq(false), sessions::updated_at.eq(Utc::now())))
            .execute(conn)?)
        })
        .await
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn get_by_uuid(&self, device_uuid: &str) -> AppResult<Option<Device>> {
        let device_uuid = device_uuid.to_owned();
        self.run(move |conn| {
            Ok(devices::table
                .filter(devices::device_uuid.eq(device_uuid))
                .select(Device::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn create(&self, device: &Device) -> AppResult<()> {
        let device = device.clone();
        self.run(move |conn| {
            diesel::insert_into(devices::table)
                .values(&device)
                .execute(conn)
                .map_err(map_unique)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Device>> {
        self.run(move |conn| {
            Ok(devices::table
                .find(id)
                .select(Device::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        self.run(move |conn| {
            Ok(devices::table
                .filter(devices::user_id.eq(user_id))
                .filter(devices::enabled.eq(true))
                .order(devices::created_at.asc())
                .select(Device::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn update(&self, id: Uuid, changes: &DeviceChanges) -> AppResult<Option<Device>> {
        let changes = changes.clone();
        self.run(move |conn| {
            Ok(diesel::update(
                devices::table
                    .filter(devices::id.eq(id))
                    .filter(devices::enabled.eq(true)),
            )
            .set((&changes, devices::updated_at.eq(Utc::now())))
            .returning(Device::as_returning())
            .get_result(conn)
            .optional()?)
        })
        .await
    }

    async fn disable(&self, id: Uuid) -> AppResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(
                devices::table
                    .filter(devices::id.eq(id))
                    .filter(devices::enabled.eq(true)),
            )
            .set((devices::enabled.eq(false), devices::updated_at.eq(Utc::now())))
            .execute(conn)?;
            Ok(updated == 1)
        })
        .await
    }
}
