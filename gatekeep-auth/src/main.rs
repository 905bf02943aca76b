use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatekeep_auth::config::AppConfig;
use gatekeep_auth::google::GoogleVerifier;
use gatekeep_auth::store::{PgStore, RedisVerificationStore};
use gatekeep_auth::{router, AppState, Backends};
use gatekeep_shared::clients::db::create_pool;
use gatekeep_shared::clients::email::EmailClient;
use gatekeep_shared::clients::redis::RedisClient;
use gatekeep_shared::clients::sms::SnsSmsClient;
use gatekeep_shared::jwt::TokenSigner;
use gatekeep_shared::middleware::{init_metrics, init_tracing, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("gatekeep-auth");

    let config = AppConfig::load()?;
    let port = config.port;

    let signer = TokenSigner::load(
        &config.jwt_private_key_path,
        &config.jwt_public_key_path,
        config.jwt_access_ttl,
    )?;

    let pool = create_pool(&config.database_url, Duration::from_secs(5))?;
    let pg = Arc::new(PgStore::new(pool));

    let redis = RedisClient::connect(&config.redis_url).await?;
    tracing::info!("connected to Redis");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mailer = EmailClient::new(
        http_client.clone(),
        &config.resend_api_key,
        &config.from_email,
        &config.from_name,
    );
    let sms = SnsSmsClient::new(&config.aws_region).await;

    if config.google_client_id.is_empty() {
        tracing::warn!("GATEKEEP_AUTH__GOOGLE_CLIENT_ID not set, google sign-in will reject every credential");
    }
    let verifier = GoogleVerifier::new(http_client, config.google_client_id.clone());

    let backends = Backends {
        users: pg.clone(),
        sessions: pg.clone(),
        devices: pg,
        codes: Arc::new(RedisVerificationStore::new(redis)),
        mailer: Arc::new(mailer),
        sms: Arc::new(sms),
        verifier: Arc::new(verifier),
    };

    let rate_limiter = RateLimiter::start(config.rate_limit());
    let metrics_handle = init_metrics()?;

    let state = Arc::new(AppState::new(
        config,
        signer,
        backends,
        rate_limiter.clone(),
        Some(metrics_handle),
    ));
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "gatekeep-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    rate_limiter.shutdown();
    tracing::info!("gatekeep-auth stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
