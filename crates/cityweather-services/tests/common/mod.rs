//! In-process collaborators for exercising the aggregator without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cityweather_core::UpstreamError;
use cityweather_services::{Aggregator, IdentifierResolver, RetryPolicy, WeatherFetcher, WorkerPool};
use cityweather_upstream::{LocationDirectory, LocationId, WeatherPayload, WeatherSource};
use serde_json::{json, Value};

/// Counts calls currently inside a collaborator, across both fakes.
#[derive(Debug, Default)]
pub struct Probe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Probe {
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(Arc::clone(self))
    }
}

/// Released on drop, so aborted calls are counted out too.
pub struct ProbeGuard(Arc<Probe>);

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Answer {
    Records(Vec<Value>),
    Fail(UpstreamError),
    FailThenRecords(usize, UpstreamError, Vec<Value>),
}

pub struct FakeDirectory {
    answers: HashMap<String, Answer>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    calls: HashMap<String, AtomicUsize>,
    probe: Arc<Probe>,
}

impl FakeDirectory {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            answers: HashMap::new(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
            calls: HashMap::new(),
            probe,
        }
    }

    /// `name` resolves to these identifiers.
    pub fn with_ids(mut self, name: &str, ids: &[i64]) -> Self {
        let records = ids
            .iter()
            .map(|id| json!({"title": name, "woeid": id}))
            .collect();
        self.answers.insert(name.to_string(), Answer::Records(records));
        self.calls.insert(name.to_string(), AtomicUsize::new(0));
        self
    }

    pub fn failing(mut self, name: &str, error: UpstreamError) -> Self {
        self.answers.insert(name.to_string(), Answer::Fail(error));
        self.calls.insert(name.to_string(), AtomicUsize::new(0));
        self
    }

    pub fn flaky(mut self, name: &str, failures: usize, error: UpstreamError, ids: &[i64]) -> Self {
        let records = ids.iter().map(|id| json!({"woeid": id})).collect();
        self.answers.insert(
            name.to_string(),
            Answer::FailThenRecords(failures, error, records),
        );
        self.calls.insert(name.to_string(), AtomicUsize::new(0));
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .get(name)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl LocationDirectory for FakeDirectory {
    async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError> {
        let _guard = self.probe.enter();
        let call = self
            .calls
            .get(name)
            .map(|c| c.fetch_add(1, Ordering::SeqCst))
            .unwrap_or(0);

        let delay = self.delays.get(name).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.answers.get(name) {
            Some(Answer::Records(records)) => Ok(records.clone()),
            Some(Answer::Fail(error)) => Err(error.clone()),
            Some(Answer::FailThenRecords(failures, error, records)) => {
                if call < *failures {
                    Err(error.clone())
                } else {
                    Ok(records.clone())
                }
            }
            None => Ok(Vec::new()),
        }
    }
}

pub struct FakeWeather {
    failing: HashMap<LocationId, UpstreamError>,
    panicking: Vec<LocationId>,
    delay: Duration,
    calls: Mutex<HashMap<LocationId, usize>>,
    probe: Arc<Probe>,
}

impl FakeWeather {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            failing: HashMap::new(),
            panicking: Vec::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            probe,
        }
    }

    pub fn failing(mut self, id: i64, error: UpstreamError) -> Self {
        self.failing.insert(LocationId(id), error);
        self
    }

    pub fn panicking(mut self, id: i64) -> Self {
        self.panicking.push(LocationId(id));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, id: i64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&LocationId(id))
            .copied()
            .unwrap_or(0)
    }
}

pub fn payload_for(id: LocationId) -> WeatherPayload {
    let mut payload = WeatherPayload::new();
    payload.insert("woeid".to_string(), json!(id.0));
    payload.insert(
        "consolidated_weather".to_string(),
        json!([{"weather_state_name": "Showers", "the_temp": 14.2}]),
    );
    payload
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn weather(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError> {
        let _guard = self.probe.enter();
        *self.calls.lock().unwrap().entry(id).or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.panicking.contains(&id) {
            panic!("weather source blew up for {}", id);
        }

        match self.failing.get(&id) {
            Some(error) => Err(error.clone()),
            None => Ok(payload_for(id)),
        }
    }
}

pub fn aggregator(
    directory: Arc<FakeDirectory>,
    weather: Arc<FakeWeather>,
    workers: usize,
    attempts: u32,
) -> Aggregator {
    let retry = RetryPolicy::new(attempts, 10, 100);
    let timeout = Duration::from_secs(30);
    Aggregator::new(
        IdentifierResolver::new(directory, retry.clone(), timeout),
        WeatherFetcher::new(weather, retry, timeout),
        WorkerPool::new(workers).unwrap(),
    )
}

pub fn ids(outcome: &cityweather_services::AggregateOutcome) -> Vec<i64> {
    outcome.records.iter().map(|r| r.location_id.0).collect()
}
