//! What one aggregation call hands back: records and failures, side by side.

use cityweather_core::{FailureKind, UpstreamError};
use cityweather_upstream::{LocationId, WeatherPayload};
use serde::{Deserialize, Serialize};

/// Weather for one identifier, tagged with the name it was resolved from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub query: String,
    pub location_id: LocationId,
    pub payload: WeatherPayload,
}

/// A lookup that produced no weather record.
///
/// `location_id` is set when the failure happened while fetching weather
/// for an identifier and unset when resolving the name itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    pub kind: FailureKind,
    pub message: String,
}

impl FailureRecord {
    pub fn resolution(query: impl Into<String>, error: &UpstreamError) -> Self {
        Self {
            query: query.into(),
            location_id: None,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn fetch(query: impl Into<String>, id: LocationId, error: &UpstreamError) -> Self {
        Self {
            query: query.into(),
            location_id: Some(id),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn no_match(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            location_id: None,
            kind: FailureKind::NoMatch,
            message: "no location matched this name".to_string(),
        }
    }
}

/// Combined result of an aggregation. Inspect both lists: a call that
/// returns records may still have failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateOutcome {
    pub records: Vec<WeatherRecord>,
    pub failures: Vec<FailureRecord>,
}

impl AggregateOutcome {
    /// True when nothing failed and nothing went unmatched.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names that resolved to zero identifiers.
    pub fn no_matches(&self) -> impl Iterator<Item = &str> {
        self.failures
            .iter()
            .filter(|f| f.kind == FailureKind::NoMatch)
            .map(|f| f.query.as_str())
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    pub fn record_for(&self, id: LocationId) -> Option<&WeatherRecord> {
        self.records.iter().find(|r| r.location_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_constructors_carry_kind() {
        let resolution = FailureRecord::resolution("", &UpstreamError::InvalidInput("empty".into()));
        assert_eq!(resolution.kind, FailureKind::InvalidInput);
        assert_eq!(resolution.location_id, None);

        let fetch = FailureRecord::fetch(
            "Springfield",
            LocationId(52),
            &UpstreamError::from_status(403, "forbidden"),
        );
        assert_eq!(fetch.kind, FailureKind::UpstreamRejected);
        assert_eq!(fetch.location_id, Some(LocationId(52)));
        assert!(fetch.message.contains("403"));
    }

    #[test]
    fn test_no_matches_lists_only_unmatched_names() {
        let outcome = AggregateOutcome {
            records: Vec::new(),
            failures: vec![
                FailureRecord::no_match("Atlantis"),
                FailureRecord::resolution("Gotham", &UpstreamError::Timeout),
                FailureRecord::no_match("El Dorado"),
            ],
        };

        assert!(!outcome.is_complete());
        assert_eq!(outcome.no_matches().collect::<Vec<_>>(), vec!["Atlantis", "El Dorado"]);
        assert_eq!(outcome.failures_of(FailureKind::UpstreamTransient).count(), 1);
    }

    #[test]
    fn test_failure_serialization_skips_missing_id() {
        let json = serde_json::to_value(FailureRecord::no_match("Atlantis")).unwrap();
        assert_eq!(json["kind"], "no_match");
        assert!(json.get("location_id").is_none());

        let json = serde_json::to_value(FailureRecord::fetch(
            "Springfield",
            LocationId(52),
            &UpstreamError::Timeout,
        ))
        .unwrap();
        assert_eq!(json["location_id"], 52);
        assert_eq!(json["kind"], "upstream_transient");
    }
}
