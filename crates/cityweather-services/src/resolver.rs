//! Identifier resolution: location name to zero or more location identifiers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cityweather_core::UpstreamError;
use cityweather_upstream::{LocationDirectory, LocationId};

use crate::retry::RetryPolicy;

/// Default field a search record carries its identifier in.
pub const DEFAULT_ID_FIELD: &str = "woeid";

/// Maps one location name to the identifiers the name-resolution
/// collaborator knows for it.
///
/// Holds no mutable state, so one resolver serves any number of concurrent
/// aggregations.
pub struct IdentifierResolver {
    directory: Arc<dyn LocationDirectory>,
    retry: RetryPolicy,
    request_timeout: Duration,
    id_field: String,
}

impl IdentifierResolver {
    pub fn new(
        directory: Arc<dyn LocationDirectory>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            retry,
            request_timeout,
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }

    /// Read identifiers from a different record field.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Resolve `name` to its identifiers.
    ///
    /// An empty list is a valid "no match" answer, not an error. Blank names
    /// fail with `InvalidInput` before any request is made.
    pub async fn resolve(&self, name: &str) -> Result<Vec<LocationId>, UpstreamError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UpstreamError::InvalidInput(
                "location name must not be empty".to_string(),
            ));
        }

        let label = format!("resolve {:?}", name);
        let records = self
            .retry
            .run(&label, || async move {
                tokio::time::timeout(self.request_timeout, self.directory.search(name))
                    .await
                    .map_err(|_| UpstreamError::Timeout)?
            })
            .await?;

        let total = records.len();
        let ids = self.identifiers(&records);
        tracing::debug!(
            "Resolved {:?} to {} identifiers ({} candidate records)",
            name,
            ids.len(),
            total
        );
        Ok(ids)
    }

    /// Keep usable identifiers in first-seen order, dropping duplicates.
    fn identifiers(&self, records: &[serde_json::Value]) -> Vec<LocationId> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter_map(|record| LocationId::from_record(record, &self.id_field))
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory with canned answers that fails the first `failures` calls.
    struct ScriptedDirectory {
        answers: HashMap<String, Vec<Value>>,
        failures: usize,
        failure: UpstreamError,
        calls: AtomicUsize,
    }

    impl ScriptedDirectory {
        fn new(answers: &[(&str, Value)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(name, records)| {
                        let records = records.as_array().cloned().unwrap_or_default();
                        (name.to_string(), records)
                    })
                    .collect(),
                failures: 0,
                failure: UpstreamError::Timeout,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_first(mut self, failures: usize, failure: UpstreamError) -> Self {
            self.failures = failures;
            self.failure = failure;
            self
        }
    }

    #[async_trait]
    impl LocationDirectory for ScriptedDirectory {
        async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.failure.clone());
            }
            Ok(self.answers.get(name).cloned().unwrap_or_default())
        }
    }

    fn resolver(directory: Arc<ScriptedDirectory>, attempts: u32) -> IdentifierResolver {
        IdentifierResolver::new(
            directory,
            RetryPolicy::new(attempts, 10, 100),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_blank_name_fails_without_request() {
        let directory = Arc::new(ScriptedDirectory::new(&[]));
        let resolver = resolver(directory.clone(), 3);

        for name in ["", "   ", "\t\n"] {
            let err = resolver.resolve(name).await.unwrap_err();
            assert!(matches!(err, UpstreamError::InvalidInput(_)));
        }
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filters_null_and_malformed_records() {
        let directory = Arc::new(ScriptedDirectory::new(&[(
            "Springfield",
            json!([
                {"title": "Springfield, IL", "woeid": 51},
                {"title": "Springfield, MA", "woeid": null},
                {"title": "Springfield, OR"},
                null,
                "garbage",
                {"title": "Springfield, MO", "woeid": "52"},
                {"title": "Springfield, VA", "woeid": 52}
            ]),
        )]));

        let ids = resolver(directory, 1).resolve("Springfield").await.unwrap();
        assert_eq!(ids, vec![LocationId(51), LocationId(52)]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let directory = Arc::new(ScriptedDirectory::new(&[("Atlantis", json!([]))]));
        let ids = resolver(directory, 1).resolve("Atlantis").await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_name_is_trimmed_before_search() {
        let directory = Arc::new(ScriptedDirectory::new(&[(
            "London",
            json!([{"woeid": 44418}]),
        )]));
        let ids = resolver(directory, 1).resolve("  London ").await.unwrap();
        assert_eq!(ids, vec![LocationId(44418)]);
    }

    #[tokio::test]
    async fn test_duplicates_collapse_in_first_seen_order() {
        let directory = Arc::new(ScriptedDirectory::new(&[(
            "Paris",
            json!([{"woeid": 3}, {"woeid": 1}, {"woeid": 3}, {"woeid": 2}]),
        )]));
        let ids = resolver(directory, 1).resolve("Paris").await.unwrap();
        assert_eq!(ids, vec![LocationId(3), LocationId(1), LocationId(2)]);
    }

    #[tokio::test]
    async fn test_repeat_resolution_is_stable() {
        let directory = Arc::new(ScriptedDirectory::new(&[(
            "Springfield",
            json!([{"woeid": 51}, {"woeid": 52}]),
        )]));
        let resolver = resolver(directory, 1);

        let mut first = resolver.resolve("Springfield").await.unwrap();
        let mut second = resolver.resolve("Springfield").await.unwrap();
        first.sort();
        second.sort();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_within_budget() {
        let directory = Arc::new(
            ScriptedDirectory::new(&[("London", json!([{"woeid": 44418}]))])
                .failing_first(2, UpstreamError::from_status(502, "bad gateway")),
        );

        let ids = resolver(directory.clone(), 3).resolve("London").await.unwrap();

        assert_eq!(ids, vec![LocationId(44418)]);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let directory = Arc::new(
            ScriptedDirectory::new(&[("London", json!([{"woeid": 44418}]))])
                .failing_first(1, UpstreamError::from_status(401, "unauthorized")),
        );

        let err = resolver(directory.clone(), 3).resolve("London").await.unwrap_err();

        assert!(matches!(err, UpstreamError::Rejected { status: 401, .. }));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_id_field() {
        let directory = Arc::new(ScriptedDirectory::new(&[(
            "Oslo",
            json!([{"id": 862592, "woeid": 1}]),
        )]));
        let resolver = resolver(directory, 1).with_id_field("id");
        assert_eq!(resolver.resolve("Oslo").await.unwrap(), vec![LocationId(862592)]);
    }

    struct StalledDirectory;

    #[async_trait]
    impl LocationDirectory for StalledDirectory {
        async fn search(&self, _name: &str) -> Result<Vec<Value>, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_as_transient() {
        let resolver = IdentifierResolver::new(
            Arc::new(StalledDirectory),
            RetryPolicy::new(2, 10, 10),
            Duration::from_millis(200),
        );

        let err = resolver.resolve("Nowhere").await.unwrap_err();
        assert_eq!(err, UpstreamError::Timeout);
    }
}
