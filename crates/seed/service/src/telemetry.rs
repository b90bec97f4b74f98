use crate::config::LoggingConfig;
use crate::error::{ServiceError, ServiceResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> ServiceResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        subscriber
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        subscriber.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| ServiceError::Telemetry(e.to_string()))
}
