use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins when set; JSON output is
/// selected with `GATEKEEP_ENV=production`.
pub fn init_tracing(service_name: &str) {
    let target = service_name.replace('-', "_");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("info,{target}=debug,gatekeep_shared=debug,tower_http=debug"))
    });

    let json = matches!(std::env::var("GATEKEEP_ENV").as_deref(), Ok("production"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
        }))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
        }))
        .init();

    tracing::info!(service = service_name, json, "tracing initialized");
}
