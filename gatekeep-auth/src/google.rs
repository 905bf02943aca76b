use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use gatekeep_shared::errors::{AppError, AppResult};

use crate::services::oauth_service::{ExternalIdentity, IdentityVerifier};

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Validates Google ID tokens through the tokeninfo endpoint, pinned to one
/// OAuth client id.
#[derive(Clone)]
pub struct GoogleVerifier {
    client: Client,
    client_id: String,
}

/// tokeninfo encodes booleans as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_true(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    #[serde(default)]
    email: String,
    email_verified: Option<Flag>,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

impl GoogleVerifier {
    pub fn new(client: Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
        }
    }

    fn accept(&self, info: TokenInfo) -> AppResult<ExternalIdentity> {
        if self.client_id.is_empty() || info.aud != self.client_id || !ISSUERS.contains(&info.iss.as_str()) {
            return Err(AppError::unauthorized());
        }
        Ok(ExternalIdentity {
            subject: info.sub,
            email: info.email,
            email_verified: info.email_verified.is_some_and(|f| f.is_true()),
            first_name: info.given_name,
            last_name: info.family_name,
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, credential: &str) -> AppResult<ExternalIdentity> {
        if credential.is_empty() {
            return Err(AppError::unauthorized());
        }

        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", credential)])
            .send()
            .await
            .context("google tokeninfo request failed")?;

        match response.status() {
            StatusCode::OK => {}
            status if status.is_client_error() => return Err(AppError::unauthorized()),
            status => return Err(anyhow::anyhow!("google tokeninfo returned {status}").into()),
        }

        let info: TokenInfo = response.json().await.context("invalid tokeninfo response")?;
        self.accept(info)
    }
}
