//! # Dispatcher Module
//!
//! The dispatcher turns one [`IncomingRequest`] into one [`Response`](crate::Response).
//!
//! ## Request Flow
//!
//! 1. A [`RequestState`](crate::RequestState) is acquired from the pool and populated
//! 2. The [`RouteMatcher`](crate::router::RouteMatcher) resolves the handler, or reports a
//!    404/405; for a 405 the `Allow` header and the allowed-method list are published first
//! 3. Global middleware, then route middleware, are folded around the terminal handler
//! 4. The chain runs under a fault trap
//! 5. A returned error, or the fault handler's error for a trapped panic, goes to the error
//!    handler, unless the response is already committed, in which case it is only logged
//! 6. The state is released back to the pool on every exit path
//!
//! ## Hooks
//!
//! | Hook                | Default                                                        |
//! |---------------------|----------------------------------------------------------------|
//! | fault               | [`default_fault_handler`]: passes the fault on as an error     |
//! | error               | [`default_error_handler`]: JSON `{"status", "message", ...}`   |
//! | not found           | [`default_not_found`]: 404 naming the path                     |
//! | method not allowed  | [`default_method_not_allowed`]: 405 with `{"allowed": [...]}`  |
//!
//! If the error handler itself fails (returns an error or panics) the dispatcher writes a
//! fixed `500 Internal Server Error` plaintext response and logs with `error_kind = "dispatch"`.
//!
//! ## Concurrency
//!
//! [`Dispatcher::dispatch`] takes `&self` and may run on any number of coroutines at once.
//! The only blocking wait it can reach is inside a
//! [`TimeoutGuard`](crate::middleware::TimeoutGuard).

mod core;
mod hooks;
mod request;

pub use self::core::Dispatcher;
pub use self::hooks::{
    default_error_handler, default_fault_handler, default_method_not_allowed, default_not_found,
    error_body, ErrorHandler, FaultHandler,
};
pub use self::request::IncomingRequest;
