//! Weather detail lookup by location identifier.

use crate::geocode::json_type;
use crate::http::{build_client, check_response, parse_base_url, send_error};
use crate::types::{LocationId, WeatherPayload};
use async_trait::async_trait;
use cityweather_core::{UpstreamConfig, UpstreamError};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// The weather-detail collaborator.
///
/// The payload comes back verbatim; nothing here interprets its fields.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn weather(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError>;
}

#[async_trait]
impl<T: WeatherSource + ?Sized> WeatherSource for Arc<T> {
    async fn weather(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError> {
        (**self).weather(id).await
    }
}

/// HTTP weather-detail client, queried as `GET <detail_url>/<id>/`.
#[derive(Debug, Clone)]
pub struct HttpWeatherSource {
    detail_url: Url,
    client: Arc<Client>,
}

impl HttpWeatherSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Ok(Self::with_client(
            parse_base_url(&config.detail_url)?,
            Arc::new(build_client(config)?),
        ))
    }

    pub fn with_client(detail_url: Url, client: Arc<Client>) -> Self {
        Self { detail_url, client }
    }

    fn url_for(&self, id: LocationId) -> Result<Url, UpstreamError> {
        self.detail_url
            .join(&format!("{}/", id))
            .map_err(|e| UpstreamError::Internal(format!("Invalid detail URL for {}: {}", id, e)))
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
    async fn weather(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError> {
        let url = self.url_for(id)?;
        tracing::debug!("Fetching weather for location {}", id);

        let response = self.client.get(url).send().await.map_err(send_error)?;
        let response = check_response(response).await?;

        match response.json::<Value>().await.map_err(send_error)? {
            Value::Object(payload) => Ok(payload),
            other => Err(UpstreamError::InvalidResponse(format!(
                "expected weather details for {} as an object, got {}",
                id,
                json_type(&other)
            ))),
        }
    }
}
