use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::counter;
use serde::Serialize;
use uuid::Uuid;

use gatekeep_shared::errors::{AppError, AppResult};
use gatekeep_shared::jwt::TokenSigner;
use gatekeep_shared::types::auth::TokenPair;

use crate::models::{Session, SessionWithUser, User};
use crate::services::device_service::DeviceResolver;
use crate::services::{password, token_service};
use crate::store::{SessionStore, UserStore};

/// Result of every flow that mints a session.
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub session: SessionWithUser,
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    devices: DeviceResolver,
    signer: TokenSigner,
    refresh_ttl: Duration,
    timing_pad: Option<Arc<str>>,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        devices: DeviceResolver,
        signer: TokenSigner,
        refresh_ttl_secs: i64,
    ) -> Self {
        let timing_pad = match password::hash_password(&token_service::generate_refresh_token()) {
            Ok(hash) => Some(Arc::from(hash)),
            Err(e) => {
                tracing::warn!(error = ?e, "failed to build login timing pad");
                None
            }
        };
        Self {
            users,
            sessions,
            devices,
            signer,
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
            timing_pad,
        }
    }

    fn burn_verification(&self, password: &str) {
        if let Some(pad) = &self.timing_pad {
            password::burn_verification(password, pad);
        }
    }

    /// `identifier` is tried as a username, then as an email. Unknown
    /// identifier, disabled account and wrong password are indistinguishable.
    pub async fn login(&self, identifier: &str, password: &str, device_uuid: Option<&str>) -> AppResult<AuthOutcome> {
        let identifier = identifier.trim();
        let user = match self.users.get_by_username(identifier).await? {
            Some(user) => Some(user),
            None => self.users.get_by_email(&identifier.to_lowercase()).await?,
        };

        let accepted = match &user {
            Some(u) if u.enabled => match u.password_hash.as_deref() {
                Some(hash) => password::verify_password(password, hash)?,
                None => {
                    self.burn_verification(password);
                    false
                }
            },
            _ => {
                self.burn_verification(password);
                false
            }
        };

        let user = match user {
            Some(user) if accepted => user,
            _ => {
                counter!("auth_login_total", "outcome" => "rejected").increment(1);
                return Err(AppError::unauthorized());
            }
        };

        let outcome = self.issue(user, device_uuid).await?;
        counter!("auth_login_total", "outcome" => "success").increment(1);
        tracing::info!(
            user_id = %outcome.session.user.id,
            session_id = %outcome.session.session.id,
            "user logged in"
        );
        Ok(outcome)
    }

    /// Resolves the device, stores a new session and signs its bearer.
    pub async fn issue(&self, user: User, device_uuid: Option<&str>) -> AppResult<AuthOutcome> {
        let device = self.devices.resolve(device_uuid, user.id).await?;
        let refresh_token = token_service::generate_refresh_token();
        let now = Utc::now();

        let session = Session {
            id: Uuid::now_v7(),
            user_id: user.id,
            device_id: device.id,
            enabled: true,
            refresh_token_hash: token_service::hash_token(&refresh_token),
            refresh_expires_at: now + self.refresh_ttl,
            created_at: now,
            updated_at: now,
        };
        self.sessions.create(&session).await?;

        let bearer = self.signer.sign(user.id, device.id, user.role(), session.id)?;
        Ok(AuthOutcome {
            tokens: TokenPair::new(bearer, refresh_token, self.signer.ttl_secs()),
            session: SessionWithUser { session, user },
        })
    }

    /// Single-use exchange: the presented token stops working the moment
    /// this succeeds. Losing the conditional write to a concurrent caller is
    /// reported as Unauthorized.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let result = self.rotate(refresh_token).await;
        let outcome = if result.is_ok() { "success" } else { "rejected" };
        counter!("auth_refresh_total", "outcome" => outcome).increment(1);
        result
    }

    async fn rotate(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let now = Utc::now();
        let old_hash = token_service::hash_token(refresh_token);

        let session = self
            .sessions
            .get_by_refresh_hash(&old_hash)
            .await?
            .filter(|s| s.is_refreshable(now))
            .ok_or_else(AppError::unauthorized)?;

        let user = self
            .users
            .get(session.user_id)
            .await?
            .filter(|u| u.enabled)
            .ok_or_else(AppError::unauthorized)?;

        let new_token = token_service::generate_refresh_token();
        let new_hash = token_service::hash_token(&new_token);
        let rotated = self
            .sessions
            .rotate_refresh(session.id, &old_hash, &new_hash, now + self.refresh_ttl)
            .await?;
        if !rotated {
            tracing::warn!(session_id = %session.id, "refresh rotation lost to a concurrent request");
            return Err(AppError::unauthorized());
        }

        let bearer = self.signer.sign(user.id, session.device_id, user.role(), session.id)?;
        tracing::info!(session_id = %session.id, "refresh token rotated");
        Ok(TokenPair::new(bearer, new_token, self.signer.ttl_secs()))
    }

    pub async fn logout(&self, session_id: Uuid) -> AppResult<()> {
        if !self.sessions.disable(session_id).await? {
            return Err(AppError::unauthorized());
        }
        tracing::info!(session_id = %session_id, "session logged out");
        Ok(())
    }

    pub async fn current(&self, session_id: Uuid) -> AppResult<SessionWithUser> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .filter(|s| s.enabled)
            .ok_or_else(AppError::unauthorized)?;
        let user = self
            .users
            .get(session.user_id)
            .await?
            .ok_or_else(AppError::unauthorized)?;
        Ok(SessionWithUser { session, user })
    }
}
