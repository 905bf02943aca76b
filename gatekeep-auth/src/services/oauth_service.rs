use std::sync::Arc;

use async_trait::async_trait;

use gatekeep_shared::errors::{AppError, AppResult};
use gatekeep_shared::types::auth::AuthProvider;

use crate::models::{User, UserChanges};
use crate::services::session_service::{AuthOutcome, SessionService};
use crate::store::UserStore;

/// Claims an external provider vouches for.
#[derive(Debug, Clone, Default)]
pub struct ExternalIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
}

/// Turns an opaque provider credential into an [`ExternalIdentity`].
/// Invalid credentials are Unauthorized; transport failures are internal.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> AppResult<ExternalIdentity>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Disabled,
    SubjectMismatch,
    PasswordlessUnlinked,
}

/// What to do with the local account an external identity maps to.
#[derive(Debug)]
pub enum LinkDecision {
    Create,
    SignIn(User),
    Link(User),
    Reject(RejectReason),
}

pub fn decide(existing: Option<User>, subject: &str) -> LinkDecision {
    let Some(user) = existing else {
        return LinkDecision::Create;
    };
    if !user.enabled {
        return LinkDecision::Reject(RejectReason::Disabled);
    }
    match user.external_subject.as_deref().filter(|s| !s.is_empty()) {
        Some(linked) if linked == subject => LinkDecision::SignIn(user),
        Some(_) => LinkDecision::Reject(RejectReason::SubjectMismatch),
        None if user.has_password() => LinkDecision::Link(user),
        None => LinkDecision::Reject(RejectReason::PasswordlessUnlinked),
    }
}

/// Keeps ASCII letters, digits, `.`, `_` and `-`, lower-cased. Falls back to
/// `user` when nothing survives.
pub fn sanitize_username(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

pub const MAX_USERNAME_SUFFIX: u32 = 99;

#[derive(Clone)]
pub struct OAuthService {
    users: Arc<dyn UserStore>,
    verifier: Arc<dyn IdentityVerifier>,
    sessions: SessionService,
}

impl OAuthService {
    pub fn new(users: Arc<dyn UserStore>, verifier: Arc<dyn IdentityVerifier>, sessions: SessionService) -> Self {
        Self {
            users,
            verifier,
            sessions,
        }
    }

    pub async fn login_with_google(&self, credential: &str, device_uuid: Option<&str>) -> AppResult<AuthOutcome> {
        let identity = self.verifier.verify(credential).await?;
        let email = identity.email.trim().to_lowercase();
        if !identity.email_verified || email.is_empty() || identity.subject.trim().is_empty() {
            return Err(AppError::unauthorized());
        }

        let existing = self.users.get_by_email(&email).await?;
        let user = match decide(existing, &identity.subject) {
            LinkDecision::Create => self.create_user(&identity, email).await?,
            LinkDecision::SignIn(user) => user,
            LinkDecision::Link(user) => {
                let changes = UserChanges {
                    external_subject: Some(identity.subject.clone()),
                    ..Default::default()
                };
                let linked = self
                    .users
                    .update(user.id, &changes)
                    .await?
                    .ok_or_else(AppError::unauthorized)?;
                tracing::info!(user_id = %linked.id, "google identity linked to existing account");
                linked
            }
            LinkDecision::Reject(reason) => {
                tracing::warn!(?reason, "google sign-in rejected");
                return Err(AppError::unauthorized());
            }
        };

        self.sessions.issue(user, device_uuid).await
    }

    async fn create_user(&self, identity: &ExternalIdentity, email: String) -> AppResult<User> {
        let local_part = email.split('@').next().unwrap_or_default();
        let username = self.derive_username(local_part).await?;

        let mut user = User::new(username, email, AuthProvider::Google);
        user.first_name = identity.first_name.clone();
        user.last_name = identity.last_name.clone();
        user.verified = true;
        user.email_confirmed = true;
        user.external_subject = Some(identity.subject.clone());

        self.users.create(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "user created from google identity");
        Ok(user)
    }

    /// `base`, then `base1` .. `base99`; Conflict once all are taken.
    pub async fn derive_username(&self, local_part: &str) -> AppResult<String> {
        let base = sanitize_username(local_part);
        let candidates = std::iter::once(base.clone())
            .chain((1..=MAX_USERNAME_SUFFIX).map(|n| format!("{base}{n}")));

        for candidate in candidates {
            if self.users.get_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(AppError::conflict("could not derive a unique username"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_shared::errors::ErrorCode;

    use crate::testing::Harness;

    fn google(subject: &str, email: &str) -> ExternalIdentity {
        ExternalIdentity {
            subject: subject.into(),
            email: email.into(),
            email_verified: true,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        }
    }

    #[test]
    fn username_sanitizing() {
        assert_eq!(sanitize_username("Alice+tag"), "alicetag");
        assert_eq!(sanitize_username("j.doe_x-1"), "j.doe_x-1");
        assert_eq!(sanitize_username("!@#$%"), "user");
        assert_eq!(sanitize_username(""), "user");
        assert_eq!(sanitize_username("José"), "jos");
        assert_eq!(sanitize_username("名前"), "user");
    }

    #[test]
    fn link_decisions() {
        let mut user = User::new("ada", "ada@example.com", AuthProvider::Local);
        user.password_hash = Some("$argon2id$stub".into());
        assert!(matches!(decide(None, "sub-1"), LinkDecision::Create));
        assert!(matches!(decide(Some(user.clone()), "sub-1"), LinkDecision::Link(_)));

        user.external_subject = Some("sub-1".into());
        assert!(matches!(decide(Some(user.clone()), "sub-1"), LinkDecision::SignIn(_)));
        assert!(matches!(
            decide(Some(user.clone()), "sub-2"),
            LinkDecision::Reject(RejectReason::SubjectMismatch)
        ));

        user.enabled = false;
        assert!(matches!(decide(Some(user.clone()), "sub-1"), LinkDecision::Reject(RejectReason::Disabled)));

        let mut provisioned = User::new("bob", "bob@example.com", AuthProvider::Local);
        provisioned.password_hash = None;
        assert!(matches!(
            decide(Some(provisioned), "sub-1"),
            LinkDecision::Reject(RejectReason::PasswordlessUnlinked)
        ));
    }

    #[tokio::test]
    async fn new_identity_creates_confirmed_account() {
        let h = Harness::new();
        h.verifier.register("cred", google("sub-1", "Ada.L@example.com"));

        let out = h.oauth.login_with_google("cred", Some("phone")).await.unwrap();
        let user = &out.session.user;
        assert_eq!(user.username, "ada.l");
        assert_eq!(user.email, "ada.l@example.com");
        assert_eq!(user.auth_provider, "google");
        assert!(user.verified && user.email_confirmed);
        assert_eq!(user.external_subject.as_deref(), Some("sub-1"));

        // second sign-in reuses the account
        let again = h.oauth.login_with_google("cred", Some("phone")).await.unwrap();
        assert_eq!(again.session.user.id, user.id);
        assert_eq!(h.store.user_count(), 1);
    }

    #[tokio::test]
    async fn unverified_or_incomplete_identity_has_no_side_effects() {
        let h = Harness::new();
        let mut unverified = google("sub-1", "a@example.com");
        unverified.email_verified = false;
        h.verifier.register("unverified", unverified);
        h.verifier.register("no-email", google("sub-2", ""));
        h.verifier.register("no-subject", google("", "c@example.com"));

        for cred in ["unverified", "no-email", "no-subject", "unknown"] {
            let err = h.oauth.login_with_google(cred, None).await.unwrap_err();
            assert!(err.is_unauthorized(), "{cred}");
        }
        assert_eq!(h.store.user_count(), 0);
        assert_eq!(h.store.session_count(), 0);
    }

    #[tokio::test]
    async fn password_account_is_auto_linked() {
        let h = Harness::new();
        let alice = h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        h.verifier.register("cred", google("sub-a", "alice@example.com"));

        let out = h.oauth.login_with_google("cred", None).await.unwrap();
        assert_eq!(out.session.user.id, alice.id);
        assert_eq!(out.session.user.external_subject.as_deref(), Some("sub-a"));
    }

    #[tokio::test]
    async fn subject_mismatch_is_rejected_without_side_effects() {
        let h = Harness::new();
        let alice = h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        h.verifier.register("first", google("sub-a", "alice@example.com"));
        h.verifier.register("takeover", google("sub-evil", "alice@example.com"));
        h.oauth.login_with_google("first", None).await.unwrap();
        let sessions_before = h.store.session_count();

        let err = h.oauth.login_with_google("takeover", None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.store.session_count(), sessions_before);
        let stored = h.user(alice.id).await;
        assert_eq!(stored.external_subject.as_deref(), Some("sub-a"));
    }

    #[tokio::test]
    async fn passwordless_account_is_not_linked_silently() {
        let h = Harness::new();
        let bob = h.seed_passwordless("bob", "bob@example.com").await;
        h.verifier.register("cred", google("sub-b", "bob@example.com"));

        assert!(h.oauth.login_with_google("cred", None).await.unwrap_err().is_unauthorized());
        assert!(h.user(bob.id).await.external_subject.is_none());
    }

    #[tokio::test]
    async fn username_suffixes() {
        let h = Harness::new();
        h.seed_passwordless("carol", "carol@a.example").await;
        assert_eq!(h.oauth.derive_username("carol").await.unwrap(), "carol1");

        for n in 1..=MAX_USERNAME_SUFFIX {
            h.seed_passwordless(&format!("carol{n}"), &format!("carol{n}@a.example")).await;
        }
        let err = h.oauth.derive_username("Carol").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Conflict));
    }
}
