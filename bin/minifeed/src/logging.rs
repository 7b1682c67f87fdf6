use mf_config::LogSettings;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured filter.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(service = env!("CARGO_PKG_NAME"), "logging initialized");
}
