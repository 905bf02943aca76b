//! Test wiring: every service over one [`MemoryStore`], recording fakes for
//! delivery and the identity provider, and the fixture RSA pair.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use gatekeep_shared::clients::email::MailSender;
use gatekeep_shared::clients::sms::SmsSender;
use gatekeep_shared::errors::{AppError, AppResult};
use gatekeep_shared::jwt::TokenSigner;
use gatekeep_shared::types::auth::AuthProvider;

use crate::models::{CodeKind, User, UserChanges, VerificationRecord};
use crate::services::{
    password, DeviceResolver, DeviceService, ExternalIdentity, IdentityVerifier, OAuthService, SessionService, UserService,
    VerificationService,
};
use crate::store::{MemoryStore, UserStore, VerificationStore};

pub const PRIVATE_PEM: &[u8] = include_bytes!("../../testdata/jwt_private.pem");
pub const PUBLIC_PEM: &[u8] = include_bytes!("../../testdata/jwt_public.pem");

pub fn signer() -> TokenSigner {
    TokenSigner::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM, 3600).unwrap()
}

/// Captures outbound messages as (recipient, body).
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl Outbox {
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_to(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .map(|(_, body)| body.clone())
    }

    fn record(&self, to: &str, body: &str) -> anyhow::Result<()> {
        if self.fail.swap(false, Ordering::SeqCst) {
            anyhow::bail!("transport unavailable");
        }
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

#[async_trait]
impl MailSender for Outbox {
    async fn send_email(&self, to: &str, _subject: &str, html: &str) -> anyhow::Result<()> {
        self.record(to, html)
    }
}

#[async_trait]
impl SmsSender for Outbox {
    async fn send_sms(&self, phone_number: &str, message: &str) -> anyhow::Result<()> {
        self.record(phone_number, message)
    }
}

/// Maps credentials to canned identities; anything else is rejected.
#[derive(Default)]
pub struct FakeVerifier {
    identities: Mutex<HashMap<String, ExternalIdentity>>,
}

impl FakeVerifier {
    pub fn register(&self, credential: &str, identity: ExternalIdentity) {
        self.identities.lock().unwrap().insert(credential.to_string(), identity);
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, credential: &str) -> AppResult<ExternalIdentity> {
        self.identities
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or_else(AppError::unauthorized)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub signer: TokenSigner,
    pub mailer: Arc<Outbox>,
    pub sms: Arc<Outbox>,
    pub verifier: Arc<FakeVerifier>,
    pub sessions: SessionService,
    pub verification: VerificationService,
    pub oauth: OAuthService,
    pub users: UserService,
    pub devices: DeviceService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let signer = signer();
        let mailer = Arc::new(Outbox::default());
        let sms = Arc::new(Outbox::default());
        let verifier = Arc::new(FakeVerifier::default());

        let sessions = SessionService::new(
            store.clone(),
            store.clone(),
            DeviceResolver::new(store.clone()),
            signer.clone(),
            30 * 24 * 3600,
        );
        let verification = VerificationService::new(
            store.clone(),
            store.clone(),
            mailer.clone(),
            sms.clone(),
            sessions.clone(),
        );
        let oauth = OAuthService::new(store.clone(), verifier.clone(), sessions.clone());
        let users = UserService::new(store.clone(), store.clone(), sessions.clone());
        let devices = DeviceService::new(store.clone());

        Self {
            store,
            signer,
            mailer,
            sms,
            verifier,
            sessions,
            verification,
            oauth,
            users,
            devices,
        }
    }

    /// A session service over the same stores with a different refresh lifetime.
    pub fn with_refresh_ttl(&self, secs: i64) -> SessionService {
        SessionService::new(
            self.store.clone(),
            self.store.clone(),
            DeviceResolver::new(self.store.clone()),
            self.signer.clone(),
            secs,
        )
    }

    pub async fn seed_user(&self, username: &str, email: &str, plain_password: &str) -> User {
        let mut user = User::new(username, email, AuthProvider::Local);
        user.password_hash = Some(password::hash_password(plain_password).unwrap());
        UserStore::create(&*self.store, &user).await.unwrap();
        user
    }

    pub async fn seed_passwordless(&self, username: &str, email: &str) -> User {
        let user = User::new(username, email, AuthProvider::Local);
        UserStore::create(&*self.store, &user).await.unwrap();
        user
    }

    pub async fn user(&self, id: Uuid) -> User {
        UserStore::get(&*self.store, id).await.unwrap().unwrap()
    }

    pub async fn set_phone(&self, id: Uuid, phone: &str) -> User {
        let changes = UserChanges {
            phone: Some(phone.to_string()),
            ..Default::default()
        };
        UserStore::update(&*self.store, id, &changes).await.unwrap().unwrap()
    }

    pub async fn pending_code(&self, user_id: Uuid, kind: CodeKind) -> Option<String> {
        VerificationStore::get(&*self.store, user_id, kind)
            .await
            .unwrap()
            .map(|r| r.code)
    }

    /// Rewrites a pending code so it is already past its expiry.
    pub async fn expire_code(&self, user_id: Uuid, kind: CodeKind, code: &str) {
        self.store
            .put(&VerificationRecord {
                user_id,
                kind,
                code: code.to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();
    }
}
