//! Tracing setup shared by the server and CLI binaries

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, otherwise the configured level
/// for this crate with request tracing at debug.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("quizpulse={},tower_http=debug", config.level).into()
    })
}

/// Install the global subscriber (`pretty` or `json` output)
pub fn init_logging(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = match config.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer()).try_init(),
    };

    // A second init (tests, embedding) keeps the existing subscriber
    if let Err(e) = result {
        tracing::debug!("Tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };
        init_logging(&config);
        init_logging(&LoggingConfig::default());
        tracing::info!(check = true, "logging initialized");
    }
}
