//! Weather fetch: one identifier, one verbatim weather payload.

use std::sync::Arc;
use std::time::Duration;

use cityweather_core::UpstreamError;
use cityweather_upstream::{LocationId, WeatherPayload, WeatherSource};

use crate::retry::RetryPolicy;

pub struct WeatherFetcher {
    source: Arc<dyn WeatherSource>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl WeatherFetcher {
    pub fn new(source: Arc<dyn WeatherSource>, retry: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            source,
            retry,
            request_timeout,
        }
    }

    /// Fetch the weather detail for a previously resolved identifier.
    ///
    /// The payload is not reshaped or validated beyond being a JSON object.
    pub async fn fetch(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError> {
        let label = format!("weather {}", id);
        self.retry
            .run(&label, || async move {
                tokio::time::timeout(self.request_timeout, self.source.weather(id))
                    .await
                    .map_err(|_| UpstreamError::Timeout)?
            })
            .await
    }
}
