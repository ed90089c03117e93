use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{AppError, ConfigError};

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream collaborator endpoints
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Retry budget for transient failures
    #[serde(default)]
    pub retry: RetrySettings,

    /// Fan-out settings
    #[serde(default)]
    pub aggregate: AggregateSettings,

    /// Optional caching in front of the collaborators
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Name-resolution endpoint, queried as `?query=<name>`
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Weather-detail endpoint, queried as `<detail_url>/<id>/`
    #[serde(default = "default_detail_url")]
    pub detail_url: String,

    /// Field of a search record holding the location identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_search_url() -> String {
    "https://www.metaweather.com/api/location/search/".to_string()
}

fn default_detail_url() -> String {
    "https://www.metaweather.com/api/location/".to_string()
}

fn default_id_field() -> String {
    "woeid".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    concat!("cityweather/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            detail_url: default_detail_url(),
            id_field: default_id_field(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per request, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (doubles each attempt)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between attempts
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Order in which aggregated records and failures are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrdering {
    /// Sorted by input position, then by identifier position
    #[default]
    Input,
    /// Whatever order the lookups finished in
    Completion,
}

/// What to do with a name that resolves to zero identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoMatchPolicy {
    /// Emit a `no_match` failure record for the name
    #[default]
    Report,
    /// Contribute nothing to either list
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSettings {
    /// Maximum resolution and fetch tasks in flight at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Deadline for a whole aggregate call, in milliseconds
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    #[serde(default)]
    pub ordering: ResultOrdering,

    #[serde(default)]
    pub no_match: NoMatchPolicy,
}

fn default_max_workers() -> usize {
    8
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            call_timeout_ms: None,
            ordering: ResultOrdering::default(),
            no_match: NoMatchPolicy::default(),
        }
    }
}

impl AggregateSettings {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Maximum entries per cache (names and weather are cached separately)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// How long a name-to-identifier answer stays fresh
    #[serde(default = "default_name_ttl_secs")]
    pub name_ttl_secs: u64,

    /// How long a weather payload stays fresh
    #[serde(default = "default_weather_ttl_secs")]
    pub weather_ttl_secs: u64,
}

fn default_cache_capacity() -> usize {
    256
}

fn default_name_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_weather_ttl_secs() -> u64 {
    30 * 60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: default_cache_capacity(),
            name_ttl_secs: default_name_ttl_secs(),
            weather_ttl_secs: default_weather_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn name_ttl(&self) -> Duration {
        Duration::from_secs(self.name_ttl_secs)
    }

    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, AppError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::Config(ConfigError::NotFound(path.display().to_string()))
            } else {
                AppError::Io(e)
            }
        })?;

        Ok(Self::from_toml(&contents)?)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), AppError> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(&self.upstream.search_url, "upstream.search_url", &mut result);
        validate_url(&self.upstream.detail_url, "upstream.detail_url", &mut result);

        if self.upstream.id_field.trim().is_empty() {
            result.add_error("upstream.id_field", "Identifier field name must not be empty");
        }

        if self.upstream.request_timeout_ms == 0 {
            result.add_error(
                "upstream.request_timeout_ms",
                "Request timeout must be greater than 0",
            );
        }

        if self.retry.max_attempts == 0 {
            result.add_error("retry.max_attempts", "At least one attempt is required");
        } else if self.retry.max_attempts > 10 {
            result.add_warning(
                "retry.max_attempts",
                "More than 10 attempts per request may hammer the upstream",
            );
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            result.add_warning(
                "retry.initial_delay_ms",
                "Initial delay exceeds max delay; every retry will wait max_delay_ms",
            );
        }

        if self.aggregate.max_workers == 0 {
            result.add_error("aggregate.max_workers", "Worker limit must be greater than 0");
        } else if self.aggregate.max_workers > 256 {
            result.add_warning(
                "aggregate.max_workers",
                "Worker limit is unusually large (>256)",
            );
        }

        if let Some(call_timeout) = self.aggregate.call_timeout_ms {
            if call_timeout == 0 {
                result.add_error(
                    "aggregate.call_timeout_ms",
                    "Call timeout must be greater than 0 when set",
                );
            } else if call_timeout < self.upstream.request_timeout_ms {
                result.add_warning(
                    "aggregate.call_timeout_ms",
                    "Call timeout is shorter than a single request timeout",
                );
            }
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            result.add_error("cache.capacity", "Cache capacity must be greater than 0");
        }

        result
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), AppError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("cannot serialize config: {}", e)))?;

        std::fs::write(config_path, contents)?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("user config directory".to_string()))?
            .join("cityweather");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }

            if url.port() == Some(0) {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
