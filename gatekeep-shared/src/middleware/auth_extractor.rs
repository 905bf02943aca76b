use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::errors::AppError;
use crate::jwt::TokenSigner;
use crate::types::auth::{AuthUser, UserRole};

/// State that can verify bearer tokens.
pub trait HasTokenSigner {
    fn token_signer(&self) -> &TokenSigner;
}

impl HasTokenSigner for TokenSigner {
    fn token_signer(&self) -> &TokenSigner {
        self
    }
}

impl<T: HasTokenSigner> HasTokenSigner for Arc<T> {
    fn token_signer(&self) -> &TokenSigner {
        (**self).token_signer()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: HasTokenSigner + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state.token_signer().verify(token)?;
        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(AppError::unauthorized)
}

/// Require Admin role
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: HasTokenSigner + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            return Err(AppError::forbidden("admin access required"));
        }
        Ok(Self(user))
    }
}
