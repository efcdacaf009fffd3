use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `default_level` is used when `RUST_LOG` is unset. Unknown levels fall back
/// to `info`. Set `RUST_LOG_FORMAT=json` for JSON lines.
pub fn init_tracing(default_level: &str) {
    let parsed = default_level.parse::<LevelFilter>().ok();
    initialize_tracing(parsed.unwrap_or(LevelFilter::INFO));

    if parsed.is_none() {
        warn!(level = default_level, "Unknown log level, using info");
    }
}

fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed(),
    };

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
