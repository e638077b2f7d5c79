//! # Middleware
//!
//! Middleware are decorators from one [`Handler`] to another. [`compose`] folds the global
//! and per-route lists around a terminal handler so the first registered middleware is the
//! outermost layer.
//!
//! Built-in layers:
//!
//! - [`TimeoutGuard`] races the rest of the chain against a deadline on a separate coroutine
//! - [`RequestSpan`] wraps the rest of the chain in a `request` tracing span
//!
//! Anything else is usually easiest to write with [`from_fn`]:
//!
//! ```rust,ignore
//! let auth = from_fn(|ctx, next| {
//!     if ctx.header("authorization").is_none() {
//!         return Err(ApplicationError::new(StatusCode::UNAUTHORIZED, "missing credentials").into());
//!     }
//!     next(ctx)
//! });
//! ```

mod core;
mod timeout;
mod tracing;

pub use self::core::{compose, from_fn, handler, FnMiddleware, Handler, Middleware};
pub use self::timeout::{TimeoutGuard, TimeoutHandler};
pub use self::tracing::RequestSpan;
