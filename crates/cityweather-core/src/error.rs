//! Centralized error types for CityWeather.
//!
//! This module provides a typed error hierarchy that:
//! - Classifies upstream failures into the kinds the aggregator reports
//! - Decides which failures are worth retrying
//! - Provides user-friendly messages for the CLI

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level application error type.
///
/// Only the binary and configuration loading surface this type. Per-item
/// lookup failures are reported as data, never as an `AppError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for terminal output.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Upstream(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration file not found. Check the path.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// How a single lookup failed, as reported alongside the aggregated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Caller-supplied name was empty or malformed. Never retried.
    InvalidInput,
    /// Network, timeout or 5xx-class failure that outlived the retry budget.
    UpstreamTransient,
    /// The collaborator refused the request or answered with something unusable.
    UpstreamRejected,
    /// The name resolved to zero identifiers.
    NoMatch,
    /// The worker running the lookup panicked or the pool was closed.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::UpstreamTransient => "upstream_transient",
            FailureKind::UpstreamRejected => "upstream_rejected",
            FailureKind::NoMatch => "no_match",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a single round-trip to the name-resolution or
/// weather-detail collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpstreamError {
    /// Build an error from a non-success HTTP status.
    ///
    /// 5xx and 408 are treated as transient server trouble; everything else
    /// (including 429 and auth failures) is a rejection retrying cannot fix.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (500..600).contains(&status) || status == 408 {
            UpstreamError::Server { status, message }
        } else {
            UpstreamError::Rejected { status, message }
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            UpstreamError::InvalidInput(_) => FailureKind::InvalidInput,
            UpstreamError::Timeout
            | UpstreamError::Connection(_)
            | UpstreamError::Server { .. } => FailureKind::UpstreamTransient,
            UpstreamError::Rejected { .. } | UpstreamError::InvalidResponse(_) => {
                FailureKind::UpstreamRejected
            }
            UpstreamError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::UpstreamTransient
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            UpstreamError::InvalidInput(_) => "Location name is empty or malformed.",
            UpstreamError::Timeout => "The request timed out. Please try again.",
            UpstreamError::Connection(_) => "Unable to connect. Check your internet connection.",
            UpstreamError::Server { .. } => {
                "The weather service is experiencing issues. Please try again later."
            }
            UpstreamError::Rejected { status: 429, .. } => {
                "Rate limit exceeded. Please wait and try again."
            }
            UpstreamError::Rejected { status: 401 | 403, .. } => {
                "The weather service refused our credentials."
            }
            UpstreamError::Rejected { .. } => "The weather service rejected the request.",
            UpstreamError::InvalidResponse(_) => "Received an unexpected response.",
            UpstreamError::Internal(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_upstream_error(self) -> UpstreamError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_upstream_error(self) -> UpstreamError {
        if self.is_timeout() {
            UpstreamError::Timeout
        } else if self.is_connect() {
            UpstreamError::Connection(self.to_string())
        } else if let Some(status) = self.status() {
            UpstreamError::from_status(status.as_u16(), self.to_string())
        } else if self.is_decode() || self.is_body() {
            UpstreamError::InvalidResponse(self.to_string())
        } else if self.is_builder() {
            UpstreamError::InvalidInput(self.to_string())
        } else {
            UpstreamError::Connection(self.to_string())
        }
    }
}
