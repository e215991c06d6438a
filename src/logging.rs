use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the console subscriber. `RUST_LOG` wins over `default_level`.
/// Returns the filter actually applied.
pub fn init_logging(default_level: &str) -> String {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let (filter, applied) = match EnvFilter::try_new(&level) {
        Ok(filter) => (filter, level),
        Err(_) => (EnvFilter::new("info"), "info".to_string()),
    };

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();

    applied
}
