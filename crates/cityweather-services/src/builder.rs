//! Assemble an [`Aggregator`] from configuration.

use std::sync::Arc;

use cityweather_core::{AppError, Config, ConfigError, UpstreamError};
use cityweather_upstream::http::{build_client, parse_base_url};
use cityweather_upstream::{
    CachedDirectory, CachedWeatherSource, HttpLocationDirectory, HttpWeatherSource,
    LocationDirectory, WeatherSource,
};
use thiserror::Error;

use crate::aggregator::{AggregateOptions, Aggregator};
use crate::fetch::WeatherFetcher;
use crate::pool::{PoolError, WorkerPool};
use crate::resolver::IdentifierResolver;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Upstream client error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
}

impl From<BuildError> for AppError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Upstream(e) => AppError::Upstream(e),
            BuildError::Pool(e) => AppError::Config(ConfigError::Invalid(e.to_string())),
        }
    }
}

/// Wire HTTP collaborators, optional caches, retry policy and a worker pool
/// sized from `config` into a ready aggregator.
///
/// # Errors
/// Fails on unusable upstream URLs or a zero worker limit.
pub fn build_aggregator(config: &Config) -> Result<Aggregator, BuildError> {
    let pool = WorkerPool::new(config.aggregate.max_workers)?;
    let retry = RetryPolicy::from(&config.retry);
    let request_timeout = config.upstream.request_timeout();

    let client = Arc::new(build_client(&config.upstream)?);
    let directory = HttpLocationDirectory::with_client(
        parse_base_url(&config.upstream.search_url)?,
        Arc::clone(&client),
    );
    let source =
        HttpWeatherSource::with_client(parse_base_url(&config.upstream.detail_url)?, client);

    let (directory, source): (Arc<dyn LocationDirectory>, Arc<dyn WeatherSource>) =
        if config.cache.enabled {
            tracing::info!(
                "Caching enabled: {} entries, names for {:?}, weather for {:?}",
                config.cache.capacity,
                config.cache.name_ttl(),
                config.cache.weather_ttl()
            );
            (
                Arc::new(CachedDirectory::new(
                    directory,
                    config.cache.capacity,
                    config.cache.name_ttl(),
                )),
                Arc::new(CachedWeatherSource::new(
                    source,
                    config.cache.capacity,
                    config.cache.weather_ttl(),
                )),
            )
        } else {
            (Arc::new(directory), Arc::new(source))
        };

    let resolver = IdentifierResolver::new(directory, retry.clone(), request_timeout)
        .with_id_field(config.upstream.id_field.clone());
    let fetcher = WeatherFetcher::new(source, retry, request_timeout);

    Ok(Aggregator::new(resolver, fetcher, pool)
        .with_options(AggregateOptions::from(&config.aggregate)))
}
