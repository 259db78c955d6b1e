use crate::config::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `LOG_LEVEL` and `LOG_FORMAT` override the configured values; a
/// `RUST_LOG`-style directive list is accepted as the level.
pub fn init(logging: &LoggingSettings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    let result = if log_format == "pretty" {
        subscriber.pretty().try_init()
    } else {
        subscriber.try_init()
    };
    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
