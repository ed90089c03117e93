//! Name resolution: turn a human-readable location name into candidate
//! records carrying location identifiers.

use crate::http::{build_client, check_response, parse_base_url, send_error};
use async_trait::async_trait;
use cityweather_core::{UpstreamConfig, UpstreamError};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// The name-resolution collaborator.
///
/// One call is one round-trip. Implementations return the raw candidate
/// records; deciding which of them are usable is the resolver's job.
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError>;
}

#[async_trait]
impl<T: LocationDirectory + ?Sized> LocationDirectory for Arc<T> {
    async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError> {
        (**self).search(name).await
    }
}

/// HTTP name-resolution client, queried as `GET <search_url>?query=<name>`.
#[derive(Debug, Clone)]
pub struct HttpLocationDirectory {
    search_url: Url,
    client: Arc<Client>,
}

impl HttpLocationDirectory {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Ok(Self::with_client(
            parse_base_url(&config.search_url)?,
            Arc::new(build_client(config)?),
        ))
    }

    pub fn with_client(search_url: Url, client: Arc<Client>) -> Self {
        Self { search_url, client }
    }
}

#[async_trait]
impl LocationDirectory for HttpLocationDirectory {
    async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError> {
        tracing::debug!("Searching locations for {:?}", name);

        let response = self
            .client
            .get(self.search_url.clone())
            .query(&[("query", name)])
            .send()
            .await
            .map_err(send_error)?;
        let response = check_response(response).await?;

        let body: Value = response.json().await.map_err(send_error)?;
        match body {
            Value::Array(records) => {
                tracing::debug!("Search for {:?} returned {} records", name, records.len());
                Ok(records)
            }
            // A null body is the upstream way of saying "nothing found".
            Value::Null => Ok(Vec::new()),
            other => Err(UpstreamError::InvalidResponse(format!(
                "expected a list of locations, got {}",
                json_type(&other)
            ))),
        }
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
