pub mod config;
pub mod google;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use gatekeep_shared::clients::email::MailSender;
use gatekeep_shared::clients::sms::SmsSender;
use gatekeep_shared::jwt::TokenSigner;
use gatekeep_shared::middleware::{HasTokenSigner, RateLimiter};

use crate::config::AppConfig;
use crate::services::{
    DeviceResolver, DeviceService, IdentityVerifier, OAuthService, SessionService, UserService,
    VerificationService,
};
use crate::store::{DeviceStore, SessionStore, UserStore, VerificationStore};

pub use routes::router;

/// Storage and delivery collaborators the services are built over.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub codes: Arc<dyn VerificationStore>,
    pub mailer: Arc<dyn MailSender>,
    pub sms: Arc<dyn SmsSender>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

pub struct AppState {
    pub config: AppConfig,
    pub signer: TokenSigner,
    pub sessions: SessionService,
    pub verification: VerificationService,
    pub oauth: OAuthService,
    pub users: UserService,
    pub devices: DeviceService,
    /// Pinged by the health check.
    pub codes: Arc<dyn VerificationStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        signer: TokenSigner,
        backends: Backends,
        rate_limiter: Arc<RateLimiter>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let sessions = SessionService::new(
            backends.users.clone(),
            backends.sessions.clone(),
            DeviceResolver::new(backends.devices.clone()),
            signer.clone(),
            config.refresh_ttl,
        );
        let verification = VerificationService::new(
            backends.users.clone(),
            backends.codes.clone(),
            backends.mailer,
            backends.sms,
            sessions.clone(),
        );
        let oauth = OAuthService::new(backends.users.clone(), backends.verifier, sessions.clone());
        let users = UserService::new(backends.users, backends.sessions, sessions.clone());
        let devices = DeviceService::new(backends.devices);

        Self {
            config,
            signer,
            sessions,
            verification,
            oauth,
            users,
            devices,
            codes: backends.codes,
            rate_limiter,
            metrics_handle,
        }
    }
}

impl HasTokenSigner for AppState {
    fn token_signer(&self) -> &TokenSigner {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    use gatekeep_shared::middleware::RateLimitConfig;
    use gatekeep_shared::types::auth::UserRole;

    use crate::models::{CodeKind, VerificationRecord};
    use crate::testing::Harness;
    use gatekeep_shared::errors::{AppError, AppResult};

    struct Unreachable;

    #[async_trait::async_trait]
    impl VerificationStore for Unreachable {
        async fn put(&self, _: &VerificationRecord) -> AppResult<()> {
            Err(AppError::Internal(anyhow::anyhow!("connection refused")))
        }

        async fn get(&self, _: uuid::Uuid, _: CodeKind) -> AppResult<Option<VerificationRecord>> {
            Err(AppError::Internal(anyhow::anyhow!("connection refused")))
        }

        async fn delete_if_matches(&self, _: uuid::Uuid, _: CodeKind, _: &str) -> AppResult<bool> {
            Err(AppError::Internal(anyhow::anyhow!("connection refused")))
        }

        async fn ping(&self) -> AppResult<()> {
            Err(AppError::Internal(anyhow::anyhow!("connection refused")))
        }
    }

    fn app(h: &Harness, burst: u32) -> Router {
        app_with_codes(h, burst, h.store.clone())
    }

    fn app_with_codes(h: &Harness, burst: u32, codes: Arc<dyn VerificationStore>) -> Router {
        let config: AppConfig = ::config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            per_second: 0.001,
            burst,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
        }));
        let backends = Backends {
            users: h.store.clone(),
            sessions: h.store.clone(),
            devices: h.store.clone(),
            codes,
            mailer: h.mailer.clone(),
            sms: h.sms.clone(),
            verifier: h.verifier.clone(),
        };
        router(Arc::new(AppState::new(config, h.signer.clone(), backends, limiter, None)))
    }

    async fn call(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            Method::POST,
            "/v1/sessions/login",
            None,
            Some(json!({ "username": username, "password": password, "device_uuid": "device-a" })),
        )
        .await
    }

    #[tokio::test]
    async fn alice_login_over_http() {
        let h = Harness::new();
        h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        let app = app(&h, 50);

        let (status, body) = login(&app, "alice", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, body) = login(&app, "alice", "correct-horse1").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert!(!data["access_token"].as_str().unwrap().is_empty());
        assert!(!data["refresh_token"].as_str().unwrap().is_empty());
        assert_eq!(data["token_type"], "Bearer");
        assert_eq!(data["session"]["user"]["username"], "alice");
        assert!(data["session"]["user"].get("password_hash").is_none());
        assert!(data["session"].get("refresh_token_hash").is_none());
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let h = Harness::new();
        h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        let app = app(&h, 50);

        let (_, body) = login(&app, "alice", "correct-horse1").await;
        let bearer = body["data"]["access_token"].as_str().unwrap().to_string();
        let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();

        let (status, current) = call(&app, Method::GET, "/v1/sessions", Some(&bearer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(current["data"]["user"]["username"], "alice");

        let (status, _) = call(&app, Method::GET, "/v1/sessions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, rotated) = call(
            &app,
            Method::POST,
            "/v1/sessions/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["data"]["refresh_token"], refresh.as_str());

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/sessions/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::POST, "/v1/sessions/logout", Some(&bearer), None).await;
        assert_eq!(status, StatusCode::OK);

        // the bearer is still well-signed, but its session is gone
        let (status, _) = call(&app, Method::GET, "/v1/sessions", Some(&bearer), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_is_rate_limited_per_client() {
        let h = Harness::new();
        h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        let app = app(&h, 2);

        assert_eq!(login(&app, "alice", "wrong").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(login(&app, "alice", "wrong").await.0, StatusCode::UNAUTHORIZED);
        let (status, body) = login(&app, "alice", "correct-horse1").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "E0006");

        // refresh is outside the limited group
        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/sessions/refresh",
            None,
            Some(json!({ "refresh_token": "unknown" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_then_confirm_email() {
        let h = Harness::new();
        let app = app(&h, 50);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "username": "dana",
                "email": "dana@example.com",
                "password": "sturdy-pass9",
                "first_name": "Dana",
                "last_name": "Scully",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bearer = body["data"]["access_token"].as_str().unwrap().to_string();
        let user_id = body["data"]["session"]["user"]["id"].as_str().unwrap().parse().unwrap();

        let (status, _) = call(&app, Method::POST, "/v1/confirm-email/request", Some(&bearer), None).await;
        assert_eq!(status, StatusCode::OK);
        let token = h.pending_code(user_id, CodeKind::EmailConfirm).await.unwrap();

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/confirm-email/validate",
            Some(&bearer),
            Some(json!({ "token": "not-the-token" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/confirm-email/validate",
            Some(&bearer),
            Some(json!({ "token": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email_confirmed"], true);
    }

    #[tokio::test]
    async fn password_recovery_over_http() {
        let h = Harness::new();
        let alice = h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        let app = app(&h, 50);

        let (status, _) = call(&app, Method::POST, "/v1/password-recovery/request", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/password-recovery/request",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let otp = h.pending_code(alice.id, CodeKind::PasswordRecovery).await.unwrap();

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/password-recovery/validate-code",
            None,
            Some(json!({ "email": "alice@example.com", "otp": otp })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["session"]["user"]["username"], "alice");
    }

    #[tokio::test]
    async fn disabling_requires_admin() {
        let h = Harness::new();
        let alice = h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        let app = app(&h, 50);
        let (_, body) = login(&app, "alice", "correct-horse1").await;
        let bearer = body["data"]["access_token"].as_str().unwrap().to_string();
        let uri = format!("/v1/users/{}", alice.id);

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&bearer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin_bearer = h
            .signer
            .sign(uuid::Uuid::now_v7(), uuid::Uuid::now_v7(), UserRole::Admin, uuid::Uuid::now_v7())
            .unwrap();
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&admin_bearer), None).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(login(&app, "alice", "correct-horse1").await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = Harness::new();
        let app = app(&h, 1);

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "gatekeep-auth");

        let (status, _) = call(&app, Method::GET, "/metrics", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_unreachable_code_store() {
        let h = Harness::new();
        let app = app_with_codes(&h, 1, Arc::new(Unreachable));

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn devices_over_http() {
        let h = Harness::new();
        h.seed_user("alice", "alice@example.com", "correct-horse1").await;
        h.seed_user("bob", "bob@example.com", "correct-horse2").await;
        let app = app(&h, 50);

        let (_, body) = login(&app, "alice", "correct-horse1").await;
        let alice = body["data"]["access_token"].as_str().unwrap().to_string();
        let (_, body) = call(
            &app,
            Method::POST,
            "/v1/sessions/login",
            None,
            Some(json!({ "username": "bob", "password": "correct-horse2", "device_uuid": "device-b" })),
        )
        .await;
        let bob = body["data"]["access_token"].as_str().unwrap().to_string();

        let (status, _) = call(&app, Method::GET, "/v1/devices", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, Method::GET, "/v1/devices", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let devices = body["data"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0]["device_uuid"], "device-a");
        let uri = format!("/v1/devices/{}", devices[0]["id"].as_str().unwrap());

        let (status, body) = call(&app, Method::PUT, &uri, Some(&alice), Some(json!({ "token": "fcm-1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["push_token"], "fcm-1");

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "E0005");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = call(&app, Method::GET, "/v1/devices", Some(&alice), None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
