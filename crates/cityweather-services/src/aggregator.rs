//! Aggregation orchestrator.
//!
//! Fans out one resolution task per name and, as each resolution lands, one
//! fetch task per identifier. Every task runs inside a worker-pool slot, so
//! resolution and fetch traffic together never exceed the pool limit. The
//! call joins over a task set that keeps growing until the last fetch is
//! known, and every task outcome ends up either as a record or a failure.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use cityweather_core::{AggregateSettings, NoMatchPolicy, ResultOrdering, UpstreamError};
use cityweather_upstream::{LocationId, WeatherPayload};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::fetch::WeatherFetcher;
use crate::outcome::{AggregateOutcome, FailureRecord, WeatherRecord};
use crate::pool::WorkerPool;
use crate::resolver::IdentifierResolver;

/// Call-level failures. Everything else is reported per item.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("Aggregation timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateOptions {
    pub ordering: ResultOrdering,
    pub no_match: NoMatchPolicy,
    pub call_timeout: Option<Duration>,
}

impl From<&AggregateSettings> for AggregateOptions {
    fn from(settings: &AggregateSettings) -> Self {
        Self {
            ordering: settings.ordering,
            no_match: settings.no_match,
            call_timeout: settings.call_timeout(),
        }
    }
}

/// (input index, identifier index); resolution-level entries use 0.
type Position = (usize, usize);

#[derive(Debug, Clone, Copy)]
enum TaskSubject {
    Resolve { query: usize },
    Fetch { query: usize, slot: usize, id: LocationId },
}

enum TaskOutput {
    Resolved {
        query: usize,
        result: Result<Vec<LocationId>, UpstreamError>,
    },
    Fetched {
        query: usize,
        slot: usize,
        id: LocationId,
        result: Result<WeatherPayload, UpstreamError>,
    },
}

/// Single collecting point for task results; only the orchestrating loop
/// touches it.
#[derive(Default)]
struct Collector {
    records: Vec<(Position, WeatherRecord)>,
    failures: Vec<(Position, FailureRecord)>,
}

impl Collector {
    fn into_outcome(mut self, ordering: ResultOrdering) -> AggregateOutcome {
        if ordering == ResultOrdering::Input {
            self.records.sort_by_key(|(position, _)| *position);
            self.failures.sort_by_key(|(position, _)| *position);
        }

        AggregateOutcome {
            records: self.records.into_iter().map(|(_, r)| r).collect(),
            failures: self.failures.into_iter().map(|(_, f)| f).collect(),
        }
    }
}

pub struct Aggregator {
    resolver: Arc<IdentifierResolver>,
    fetcher: Arc<WeatherFetcher>,
    pool: WorkerPool,
    options: AggregateOptions,
}

impl Aggregator {
    pub fn new(resolver: IdentifierResolver, fetcher: WeatherFetcher, pool: WorkerPool) -> Self {
        Self {
            resolver: Arc::new(resolver),
            fetcher: Arc::new(fetcher),
            pool,
            options: AggregateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Resolve every name and fetch weather for every identifier found.
    ///
    /// # Errors
    /// Only `TimedOut`, when a call timeout is configured and expires.
    pub async fn aggregate<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<AggregateOutcome, AggregateError> {
        self.aggregate_with_cancel(names, &CancellationToken::new())
            .await
    }

    /// Like [`Aggregator::aggregate`], but stops early when `cancel` fires.
    ///
    /// On cancellation or timeout every in-flight task is aborted and awaited
    /// before this returns, so no worker outlives the call.
    ///
    /// # Errors
    /// `Cancelled` or `TimedOut`; per-item failures never fail the call.
    pub async fn aggregate_with_cancel<S: AsRef<str>>(
        &self,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<AggregateOutcome, AggregateError> {
        let queries: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        tracing::info!(
            "Aggregating weather for {} names with {} workers",
            queries.len(),
            self.pool.limit()
        );

        let deadline = self.options.call_timeout.map(|t| Instant::now() + t);
        let expiry = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut tasks: JoinSet<(u64, TaskOutput)> = JoinSet::new();
        let mut pending_tasks: HashMap<u64, TaskSubject> = HashMap::new();
        let mut next_task = 0u64;
        let mut collector = Collector::default();

        for (query, name) in queries.iter().enumerate() {
            self.spawn(
                &mut tasks,
                &mut pending_tasks,
                &mut next_task,
                TaskSubject::Resolve { query },
                name.clone(),
            );
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::warn!("Aggregation cancelled with {} tasks outstanding", tasks.len());
                    tasks.shutdown().await;
                    return Err(AggregateError::Cancelled);
                }

                _ = &mut expiry => {
                    let limit = self.options.call_timeout.unwrap_or_default();
                    tracing::warn!(
                        "Aggregation timed out after {:?} with {} tasks outstanding",
                        limit,
                        tasks.len()
                    );
                    tasks.shutdown().await;
                    return Err(AggregateError::TimedOut(limit));
                }

                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((task, output)) => {
                            pending_tasks.remove(&task);
                            self.collect(
                                output,
                                &queries,
                                &mut collector,
                                &mut tasks,
                                &mut pending_tasks,
                                &mut next_task,
                            );
                        }
                        Err(e) => tracing::error!("Aggregation task failed: {}", e),
                    }
                }
            }
        }

        // Whatever is still pending died without reporting back.
        for subject in pending_tasks.into_values() {
            let error = UpstreamError::Internal("worker task panicked".to_string());
            match subject {
                TaskSubject::Resolve { query } => collector.failures.push((
                    (query, 0),
                    FailureRecord::resolution(queries[query].as_str(), &error),
                )),
                TaskSubject::Fetch { query, slot, id } => collector.failures.push((
                    (query, slot),
                    FailureRecord::fetch(queries[query].as_str(), id, &error),
                )),
            }
        }

        let outcome = collector.into_outcome(self.options.ordering);
        tracing::info!(
            "Aggregation finished: {} records, {} failures",
            outcome.records.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<(u64, TaskOutput)>,
        pending_tasks: &mut HashMap<u64, TaskSubject>,
        next_task: &mut u64,
        subject: TaskSubject,
        name: String,
    ) {
        let task = *next_task;
        *next_task += 1;
        pending_tasks.insert(task, subject);

        let pool = self.pool.clone();
        match subject {
            TaskSubject::Resolve { query } => {
                let resolver = Arc::clone(&self.resolver);
                tracing::debug!("Scheduling resolution of {:?}", name);
                tasks.spawn(async move {
                    let result = pool
                        .run(resolver.resolve(&name))
                        .await
                        .unwrap_or_else(|e| Err(UpstreamError::Internal(e.to_string())));
                    (task, TaskOutput::Resolved { query, result })
                });
            }
            TaskSubject::Fetch { query, slot, id } => {
                let fetcher = Arc::clone(&self.fetcher);
                tracing::debug!("Scheduling weather fetch for {} ({:?})", id, name);
                tasks.spawn(async move {
                    let result = pool
                        .run(fetcher.fetch(id))
                        .await
                        .unwrap_or_else(|e| Err(UpstreamError::Internal(e.to_string())));
                    (
                        task,
                        TaskOutput::Fetched {
                            query,
                            slot,
                            id,
                            result,
                        },
                    )
                });
            }
        }
    }

    fn collect(
        &self,
        output: TaskOutput,
        queries: &[String],
        collector: &mut Collector,
        tasks: &mut JoinSet<(u64, TaskOutput)>,
        pending_tasks: &mut HashMap<u64, TaskSubject>,
        next_task: &mut u64,
    ) {
        match output {
            TaskOutput::Resolved { query, result } => {
                let name = &queries[query];
                match result {
                    Ok(ids) if ids.is_empty() => match self.options.no_match {
                        NoMatchPolicy::Report => {
                            tracing::info!("No location matched {:?}", name);
                            collector
                                .failures
                                .push(((query, 0), FailureRecord::no_match(name.as_str())));
                        }
                        NoMatchPolicy::Drop => {
                            tracing::debug!("No location matched {:?}, dropping", name);
                        }
                    },
                    Ok(ids) => {
                        for (slot, id) in ids.into_iter().enumerate() {
                            self.spawn(
                                tasks,
                                pending_tasks,
                                next_task,
                                TaskSubject::Fetch { query, slot, id },
                                name.clone(),
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Resolving {:?} failed: {}", name, e);
                        collector
                            .failures
                            .push(((query, 0), FailureRecord::resolution(name.as_str(), &e)));
                    }
                }
            }
            TaskOutput::Fetched {
                query,
                slot,
                id,
                result,
            } => {
                let name = &queries[query];
                match result {
                    Ok(payload) => collector.records.push((
                        (query, slot),
                        WeatherRecord {
                            query: name.clone(),
                            location_id: id,
                            payload,
                        },
                    )),
                    Err(e) => {
                        tracing::warn!("Fetching weather for {} ({:?}) failed: {}", id, name, e);
                        collector
                            .failures
                            .push(((query, slot), FailureRecord::fetch(name.as_str(), id, &e)));
                    }
                }
            }
        }
    }
}
