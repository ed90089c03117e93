//! Upstream collaborators for CityWeather
//!
//! Name resolution and weather detail lookups over HTTP, the traits the
//! aggregator consumes them through, and caching decorators for both.

pub mod cache;
pub mod geocode;
pub mod http;
pub mod provider;
pub mod types;

pub use cache::{CachedDirectory, CachedWeatherSource, LfuCache};
pub use geocode::{HttpLocationDirectory, LocationDirectory};
pub use provider::{HttpWeatherSource, WeatherSource};
pub use types::{LocationId, WeatherPayload};
