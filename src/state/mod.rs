//! # Request State
//!
//! [`RequestState`] holds everything mutable about one request: path parameters, the
//! key/value store middleware use to talk to each other, the composed chain and its cursor,
//! the buffered response and the root cancellation scope. [`StatePool`] recycles instances
//! between requests.
//!
//! ## Lifecycle
//!
//! 1. [`StatePool::acquire`] pops (or creates) an instance and gives it a fresh request id and
//!    root scope.
//! 2. The dispatcher copies the transport request in, sets the route parameters and the chain,
//!    then wraps the state in an `Arc` for the duration of the chain.
//! 3. [`StatePool::release`] resets every field and returns the instance to the free list.
//!
//! ## Concurrency
//!
//! Outside a [`TimeoutGuard`](crate::middleware::TimeoutGuard) only the request's own task
//! touches its state. While a guard's worker is alive both tasks can reach the store and the
//! response, which is why those two are lock-protected; everything else is written before
//! the state is shared and only read afterwards.

mod core;
mod pool;

pub use self::core::{keys, RequestState, StoreValue, NOT_STARTED};
pub use self::pool::{PoolMetrics, StatePool};
