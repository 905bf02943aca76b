use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use gatekeep_shared::clients::email::{email_confirmation_email, password_recovery_email, MailSender};
use gatekeep_shared::clients::sms::SmsSender;
use gatekeep_shared::errors::{AppError, AppResult};

use crate::models::{CodeKind, User, UserChanges, VerificationRecord};
use crate::services::session_service::{AuthOutcome, SessionService};
use crate::store::{UserStore, VerificationStore};

/// OTP symbols: upper-case alphanumerics minus 0, 1, I, L and O.
pub const OTP_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
pub const OTP_LENGTH: usize = 6;

pub const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const TOKEN_LENGTH: usize = 32;

fn random_code(alphabet: &[u8], len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// A fresh code in the shape `kind` is delivered in.
pub fn generate_code(kind: CodeKind) -> String {
    match kind {
        CodeKind::PasswordRecovery | CodeKind::PhoneConfirm => random_code(OTP_ALPHABET, OTP_LENGTH),
        CodeKind::EmailConfirm => random_code(TOKEN_ALPHABET, TOKEN_LENGTH),
    }
}

/// Absent, mismatched and expired all produce the same rejection. The
/// comparison runs in constant time over the stored code.
pub fn check_code<'a>(
    record: Option<&'a VerificationRecord>,
    submitted: &str,
    now: DateTime<Utc>,
) -> AppResult<&'a VerificationRecord> {
    let record = record.ok_or_else(AppError::unauthorized)?;
    let matches: bool = record.code.as_bytes().ct_eq(submitted.as_bytes()).into();
    if !matches || record.is_expired(now) {
        return Err(AppError::unauthorized());
    }
    Ok(record)
}

/// Issues, delivers and redeems the three kinds of out-of-band codes.
#[derive(Clone)]
pub struct VerificationService {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn VerificationStore>,
    mailer: Arc<dyn MailSender>,
    sms: Arc<dyn SmsSender>,
    sessions: SessionService,
}

impl VerificationService {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: Arc<dyn VerificationStore>,
        mailer: Arc<dyn MailSender>,
        sms: Arc<dyn SmsSender>,
        sessions: SessionService,
    ) -> Self {
        Self {
            users,
            codes,
            mailer,
            sms,
            sessions,
        }
    }

    /// Stores a new code for `user_id`, replacing any pending one of the
    /// same kind, and returns it for delivery.
    async fn issue(&self, user_id: Uuid, kind: CodeKind) -> AppResult<String> {
        let code = generate_code(kind);
        self.codes
            .put(&VerificationRecord {
                user_id,
                kind,
                code: code.clone(),
                expires_at: Utc::now() + kind.ttl(),
            })
            .await?;
        counter!("verification_codes_issued_total", "kind" => kind.as_str()).increment(1);
        Ok(code)
    }

    /// Checks and burns a code. A spent code that cannot be deleted is
    /// logged and accepted; a code deleted by someone else first is not.
    async fn consume(&self, user_id: Uuid, kind: CodeKind, submitted: &str) -> AppResult<()> {
        let record = self.codes.get(user_id, kind).await?;
        let checked = check_code(record.as_ref(), submitted, Utc::now()).map(|r| r.code.clone());
        let code = match checked {
            Ok(code) => code,
            Err(e) => {
                counter!("verification_codes_validated_total", "kind" => kind.as_str(), "outcome" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };

        match self.codes.delete_if_matches(user_id, kind, &code).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = %user_id, kind = %kind, "verification code already consumed");
                counter!("verification_codes_validated_total", "kind" => kind.as_str(), "outcome" => "replayed")
                    .increment(1);
                return Err(AppError::unauthorized());
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, kind = %kind, error = ?e, "failed to delete spent verification code");
            }
        }

        counter!("verification_codes_validated_total", "kind" => kind.as_str(), "outcome" => "accepted").increment(1);
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.users.get_by_email(&email.trim().to_lowercase()).await
    }

    /// Email is the only recovery channel. An unknown address is accepted
    /// without sending anything.
    pub async fn request_password_recovery(&self, email: Option<&str>, phone: Option<&str>) -> AppResult<()> {
        let email = match (email, phone) {
            (Some(email), _) => email,
            (None, Some(_)) => return Err(AppError::bad_request("phone recovery not supported; provide email")),
            (None, None) => return Err(AppError::bad_request("email or phone_number required")),
        };

        let Some(user) = self.user_by_email(email).await?.filter(|u| u.enabled) else {
            tracing::info!("password recovery requested for unknown account");
            return Ok(());
        };

        let code = self.issue(user.id, CodeKind::PasswordRecovery).await?;
        let (subject, html) = password_recovery_email(&code);
        self.mailer.send_email(&user.email, subject, &html).await?;

        tracing::info!(user_id = %user.id, "password recovery code sent");
        Ok(())
    }

    /// A valid recovery code signs the user in on `device_uuid`.
    pub async fn validate_password_recovery(
        &self,
        email: Option<&str>,
        code: &str,
        device_uuid: Option<&str>,
    ) -> AppResult<AuthOutcome> {
        let email = email.ok_or_else(|| AppError::bad_request("email required to validate code"))?;
        let user = self
            .user_by_email(email)
            .await?
            .filter(|u| u.enabled)
            .ok_or_else(AppError::unauthorized)?;

        self.consume(user.id, CodeKind::PasswordRecovery, code).await?;

        let outcome = self.sessions.issue(user, device_uuid).await?;
        tracing::info!(user_id = %outcome.session.user.id, "password recovery code accepted");
        Ok(outcome)
    }

    pub async fn request_email_confirmation(&self, user_id: Uuid) -> AppResult<()> {
        let user = self.users.get(user_id).await?.ok_or_else(AppError::unauthorized)?;

        let token = self.issue(user.id, CodeKind::EmailConfirm).await?;
        let (subject, html) = email_confirmation_email(&token);
        self.mailer.send_email(&user.email, subject, &html).await?;
        Ok(())
    }

    pub async fn validate_email_confirmation(&self, user_id: Uuid, token: &str) -> AppResult<User> {
        self.consume(user_id, CodeKind::EmailConfirm, token).await?;
        let changes = UserChanges {
            email_confirmed: Some(true),
            ..Default::default()
        };
        let user = self.users.update(user_id, &changes).await?.ok_or_else(AppError::unauthorized)?;
        tracing::info!(user_id = %user_id, "email confirmed");
        Ok(user)
    }

    pub async fn request_phone_confirmation(&self, user_id: Uuid) -> AppResult<()> {
        let user = self.users.get(user_id).await?.ok_or_else(AppError::unauthorized)?;
        let phone = user
            .phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::bad_request("no phone number on account"))?;

        let code = self.issue(user.id, CodeKind::PhoneConfirm).await?;
        self.sms
            .send_sms(phone, &format!("Your verification code: {code}"))
            .await?;
        Ok(())
    }

    pub async fn validate_phone_confirmation(&self, user_id: Uuid, code: &str) -> AppResult<User> {
        self.consume(user_id, CodeKind::PhoneConfirm, code).await?;
        let changes = UserChanges {
            phone_confirmed: Some(true),
            ..Default::default()
        };
        let user = self.users.update(user_id, &changes).await?.ok_or_else(AppError::unauthorized)?;
        tracing::info!(user_id = %user_id, "phone confirmed");
        Ok(user)
    }
}
