//! # State Pool
//!
//! Reuses [`RequestState`] instances across requests.
//!
//! ## Guarantees
//!
//! - [`StatePool::acquire`] never fails and hands out an instance no in-flight request owns.
//!   Ownership is by value, so two requests cannot hold the same instance.
//! - [`StatePool::release`] recycles only when the caller holds the *last* reference. A state
//!   still referenced by a detached [`TimeoutGuard`](crate::middleware::TimeoutGuard) worker is
//!   dropped instead, so late writes from that worker can never reach the next request.
//! - Recycled states are reset entry by entry before they re-enter the free list.

use super::RequestState;
use crate::runtime_config::RuntimeConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters for a [`StatePool`]
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// States allocated because the free list was empty
    pub created: AtomicU64,
    /// Acquisitions served from the free list
    pub reused: AtomicU64,
    /// States returned to the free list
    pub released: AtomicU64,
    /// States dropped at release (still shared, or the free list was full)
    pub discarded: AtomicU64,
    /// States currently checked out
    pub in_flight: AtomicUsize,
}

impl PoolMetrics {
    #[must_use]
    pub fn get_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct StatePool {
    free: Mutex<Vec<RequestState>>,
    max_idle: usize,
    metrics: PoolMetrics,
}

impl Default for StatePool {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl StatePool {
    /// Create an empty pool that keeps at most `max_idle` released states.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
            metrics: PoolMetrics::default(),
        }
    }

    /// Create a pool sized from runtime configuration, allocating `pool_prewarm` states up front.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let pool = Self::new(config.pool_max_idle);
        let prewarm = config.pool_prewarm.min(config.pool_max_idle);
        if prewarm > 0 {
            let mut free = pool.free.lock();
            free.reserve(prewarm);
            free.extend((0..prewarm).map(|_| RequestState::new()));
            info!(prewarm, max_idle = config.pool_max_idle, "Request state pool prewarmed");
        }
        pool
    }

    pub fn acquire(&self) -> RequestState {
        let recycled = self.free.lock().pop();
        let mut state = match recycled {
            Some(state) => {
                self.metrics.reused.fetch_add(1, Ordering::Relaxed);
                state
            }
            None => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                RequestState::new()
            }
        };
        state.begin();
        self.metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        state
    }

    /// Return a state to the pool. Returns `true` when it was recycled.
    pub fn release(&self, state: Arc<RequestState>) -> bool {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);

        let mut state = match Arc::try_unwrap(state) {
            Ok(state) => state,
            Err(shared) => {
                self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %shared.request_id(),
                    references = Arc::strong_count(&shared),
                    "Request state still shared by a detached task - not recycled"
                );
                return false;
            }
        };

        state.reset();

        let mut free = self.free.lock();
        if free.len() >= self.max_idle {
            drop(free);
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        free.push(state);
        drop(free);
        self.metrics.released.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of states waiting in the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}
