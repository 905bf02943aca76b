use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// Outbound mail transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Resend HTTP API client.
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl EmailClient {
    pub fn new(client: Client, api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }
}

#[async_trait]
impl MailSender for EmailClient {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let request = ResendRequest {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("email send failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("email API error ({status}): {body}");
        }

        tracing::debug!(subject = %subject, "email sent");
        Ok(())
    }
}

fn code_block(title: &str, intro: &str, code: &str, footer: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
        <h2 style="color: #0f766e;">{title}</h2>
        <p>{intro}</p>
        <div style="background: #f1f5f9; color: #0f172a; font-size: 28px; font-weight: bold; text-align: center; padding: 20px; border-radius: 8px; letter-spacing: 6px; word-break: break-all;">{code}</div>
        <p style="color: #666; margin-top: 20px;">{footer}</p>
        </div>"#
    )
}

/// Subject and body for a password-recovery OTP.
pub fn password_recovery_email(code: &str) -> (&'static str, String) {
    (
        "Password Recovery OTP",
        code_block(
            "Password recovery",
            "Your one-time recovery code is:",
            code,
            "This code expires in 15 minutes. If you did not request it, ignore this email.",
        ),
    )
}

/// Subject and body for an email-confirmation token.
pub fn email_confirmation_email(token: &str) -> (&'static str, String) {
    (
        "Confirm your email",
        code_block(
            "Confirm your email",
            "Use this token to confirm your address:",
            token,
            "This token expires in 24 hours.",
        ),
    )
}
