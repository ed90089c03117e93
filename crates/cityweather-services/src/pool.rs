//! Bounded worker pool.
//!
//! The pool does not own threads; it hands out slots. A task holds its slot
//! for as long as its future runs, so at most `limit` tasks are ever in
//! flight regardless of how many are spawned.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker limit must be greater than 0")]
    ZeroLimit,

    #[error("Worker pool is closed")]
    Closed,
}

#[derive(Debug)]
struct PoolState {
    slots: Semaphore,
    limit: usize,
    in_flight: AtomicUsize,
    high_water_mark: AtomicUsize,
}

/// Explicitly sized pool shared by every task of an aggregation.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    state: Arc<PoolState>,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Result<Self, PoolError> {
        if limit == 0 {
            return Err(PoolError::ZeroLimit);
        }

        Ok(Self {
            state: Arc::new(PoolState {
                slots: Semaphore::new(limit),
                limit,
                in_flight: AtomicUsize::new(0),
                high_water_mark: AtomicUsize::new(0),
            }),
        })
    }

    pub fn limit(&self) -> usize {
        self.state.limit
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Most tasks ever observed holding a slot at the same time.
    pub fn high_water_mark(&self) -> usize {
        self.state.high_water_mark.load(Ordering::SeqCst)
    }

    /// Stop handing out slots. Tasks already running finish normally.
    pub fn close(&self) {
        self.state.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.state.slots.is_closed()
    }

    /// Wait for a free slot, then run `work` while holding it.
    pub async fn run<F>(&self, work: F) -> Result<F::Output, PoolError>
    where
        F: Future,
    {
        let _permit = self
            .state
            .slots
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;
        let _slot = SlotGuard::enter(&self.state);

        Ok(work.await)
    }
}

/// Keeps the in-flight counter honest even when the task is aborted mid-run.
struct SlotGuard<'a> {
    state: &'a PoolState,
}

impl<'a> SlotGuard<'a> {
    fn enter(state: &'a PoolState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.high_water_mark.fetch_max(now, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
