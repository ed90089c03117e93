//! In-memory caching in front of the upstream collaborators.
//!
//! Both decorators wrap an existing collaborator and expose the same trait,
//! so callers cannot tell whether a cache sits in between. Only successful
//! answers are cached. Entries expire after a TTL; when a cache is full the
//! least frequently used entry goes first (oldest insertion breaks ties).

use crate::geocode::LocationDirectory;
use crate::provider::WeatherSource;
use crate::types::{LocationId, WeatherPayload};
use async_trait::async_trait;
use cityweather_core::UpstreamError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    hits: u64,
    seq: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_seq: u64,
}

/// TTL cache with least-frequently-used eviction.
#[derive(Debug)]
pub struct LfuCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> LfuCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Returns a fresh value and counts the hit; expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let now = Instant::now();

        match state.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        let now = Instant::now();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            state.entries.retain(|_, entry| entry.expires_at > now);
        }

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.hits, entry.seq))
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                state.entries.remove(&victim);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
                hits: 0,
                seq,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name-resolution collaborator with cached answers.
pub struct CachedDirectory<D> {
    inner: D,
    cache: LfuCache<String, Vec<Value>>,
}

impl<D: LocationDirectory> CachedDirectory<D> {
    pub fn new(inner: D, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: LfuCache::new(capacity, ttl),
        }
    }
}

#[async_trait]
impl<D: LocationDirectory> LocationDirectory for CachedDirectory<D> {
    async fn search(&self, name: &str) -> Result<Vec<Value>, UpstreamError> {
        if let Some(records) = self.cache.get(&name.to_string()) {
            tracing::debug!("Location cache hit for {:?}", name);
            return Ok(records);
        }

        tracing::debug!("Location cache miss for {:?}", name);
        let records = self.inner.search(name).await?;
        self.cache.insert(name.to_string(), records.clone());
        Ok(records)
    }
}

/// Weather-detail collaborator with cached payloads.
pub struct CachedWeatherSource<S> {
    inner: S,
    cache: LfuCache<LocationId, WeatherPayload>,
}

impl<S: WeatherSource> CachedWeatherSource<S> {
    pub fn new(inner: S, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: LfuCache::new(capacity, ttl),
        }
    }
}

#[async_trait]
impl<S: WeatherSource> WeatherSource for CachedWeatherSource<S> {
    async fn weather(&self, id: LocationId) -> Result<WeatherPayload, UpstreamError> {
        if let Some(payload) = self.cache.get(&id) {
            tracing::debug!("Weather cache hit for {}", id);
            return Ok(payload);
        }

        tracing::debug!("Weather cache miss for {}", id);
        let payload = self.inner.weather(id).await?;
        self.cache.insert(id, payload.clone());
        Ok(payload)
    }
}
