pub mod devices;
pub mod health;
pub mod sessions;
pub mod users;
pub mod verification;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use gatekeep_shared::middleware::{metrics_middleware, rate_limit};

use crate::AppState;

/// Public endpoints that take a password, code or identity credential share
/// the per-client token bucket.
fn limited_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions/login", post(sessions::login))
        .route("/sessions/google", post(sessions::google))
        .route("/users", post(users::register))
        .route("/password-recovery/request", post(verification::request_password_recovery))
        .route("/password-recovery/validate-code", post(verification::validate_password_recovery))
        .route("/confirm-email/request", post(verification::request_email_confirmation))
        .route("/confirm-email/validate", post(verification::validate_email_confirmation))
        .route("/confirm-phone/request", post(verification::request_phone_confirmation))
        .route("/confirm-phone/validate", post(verification::validate_phone_confirmation))
        .route_layer(middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit))
}

fn open_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(sessions::current))
        .route("/sessions/refresh", post(sessions::refresh))
        .route("/sessions/logout", post(sessions::logout))
        .route("/users/me/password", post(users::change_password))
        .route("/users/:id", delete(users::disable))
        .route("/devices", get(devices::list))
        .route(
            "/devices/:id",
            get(devices::get).put(devices::update).delete(devices::disable),
        )
}

fn cors(origins: &[&str]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(300));

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let v1 = limited_routes(&state).merge(open_routes());
    let timeout = TimeoutLayer::new(state.config.request_timeout());
    let cors = cors(&state.config.allowed_origins());

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/v1", v1)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
