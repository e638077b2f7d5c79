//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the request execution core.
//!
//! ## Environment Variables
//!
//! ### `RELAY_STACK_SIZE`
//!
//! Stack size for the worker coroutines spawned by
//! [`TimeoutGuard`](crate::middleware::TimeoutGuard). Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB)
//!
//! ### `RELAY_POOL_MAX_IDLE`
//!
//! Upper bound on idle [`RequestState`](crate::state::RequestState) instances kept by the
//! [`StatePool`](crate::state::StatePool). Released states beyond the bound are dropped.
//!
//! Default: `1024`
//!
//! ### `RELAY_POOL_PREWARM`
//!
//! Number of states allocated up front when the dispatcher is built.
//!
//! Default: `0`
//!
//! ### `RELAY_WARN_EMPTY_RESPONSE`
//!
//! Whether the dispatcher logs a developer warning when a handler returns `Ok` without
//! writing a response.
//!
//! Default: `true`
//!
//! ## Usage
//!
//! ```rust
//! use relaycore::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Guard stack size: {} bytes", config.stack_size);
//! ```

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_POOL_MAX_IDLE: usize = 1024;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for guard worker coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
    /// Maximum number of idle request states retained by the pool
    pub pool_max_idle: usize,
    /// Number of request states allocated when the pool is created
    pub pool_prewarm: usize,
    /// Log a warning when a handler succeeds without writing a response
    pub warn_on_empty_response: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
            pool_prewarm: 0,
            warn_on_empty_response: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to defaults for
    /// anything missing or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stack_size: env::var("RELAY_STACK_SIZE")
                .ok()
                .and_then(|v| parse_size(&v))
                .unwrap_or(defaults.stack_size),
            pool_max_idle: env::var("RELAY_POOL_MAX_IDLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_max_idle),
            pool_prewarm: env::var("RELAY_POOL_PREWARM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_prewarm),
            warn_on_empty_response: env::var("RELAY_WARN_EMPTY_RESPONSE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.warn_on_empty_response),
        }
    }
}

/// Parse a byte size given either in decimal or as `0x`-prefixed hexadecimal.
#[must_use]
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}
