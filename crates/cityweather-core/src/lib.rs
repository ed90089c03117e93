pub mod config;
pub mod error;

pub use config::{
    AggregateSettings, CacheSettings, Config, NoMatchPolicy, ResultOrdering, RetrySettings,
    UpstreamConfig, ValidationResult,
};
pub use error::{AppError, ConfigError, FailureKind, ReqwestErrorExt, UpstreamError};

use anyhow::Result;

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Calling this
/// twice is harmless.
pub fn init(default_level: &str) -> Result<()> {
    let initialized = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    if initialized.is_ok() {
        tracing::debug!("CityWeather core initialized");
    }
    Ok(())
}
