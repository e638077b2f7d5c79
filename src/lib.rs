//! # relaycore
//!
//! **relaycore** is the request execution core of a coroutine-powered HTTP framework built on the
//! `may` runtime. It sits between a transport (which parses bytes into requests and sends
//! responses back) and application handlers, and owns everything in between: pooled
//! per-request state, onion-ordered middleware, panic containment, error reporting and
//! deadline enforcement.
//!
//! ## Architecture
//!
//! - **[`state`]** - pooled [`RequestState`] with a lock-protected key/value store
//! - **[`context`]** - the [`Context`] view handlers receive
//! - **[`middleware`]** - [`Middleware`] composition, [`TimeoutGuard`], [`RequestSpan`]
//! - **[`router`]** - the [`RouteMatcher`] interface and the [`RouteTable`] implementation
//! - **[`dispatcher`]** - [`Dispatcher`]: routing, fault trapping, error reporting
//! - **[`error`]** - the error taxonomy ([`ApplicationError`], [`Error`])
//! - **[`scope`]** - cooperative cancellation with deadlines
//! - **[`response`]** - the buffered [`Response`] and its commit point
//! - **[`logging`]** - `tracing-subscriber` setup
//! - **[`runtime_config`]** - environment-driven tuning
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Dispatcher
//!     participant Pool as StatePool
//!     participant Router as RouteMatcher
//!     participant Chain as Middleware Chain
//!     participant Guard as TimeoutGuard
//!     participant Worker as Worker<br/>(Coroutine)
//!     participant Handler
//!
//!     Transport->>Dispatcher: dispatch(IncomingRequest)
//!     Dispatcher->>Pool: acquire()
//!     Dispatcher->>Router: lookup(method, path)
//!     alt No route
//!         Router-->>Dispatcher: NotFound / MethodNotAllowed
//!         Dispatcher->>Chain: not-found / 405 handler
//!     else Matched
//!         Router-->>Dispatcher: handler + middleware + params
//!         Dispatcher->>Chain: compose(global, route, handler)
//!         Chain->>Guard: next(ctx)
//!         Guard->>Worker: spawn with derived scope
//!         Worker->>Handler: handler(ctx)
//!         alt Result first
//!             Worker-->>Guard: result channel
//!         else Panic
//!             Worker-->>Guard: fault channel
//!             Guard->>Guard: resume_unwind
//!         else Deadline
//!             Guard->>Guard: detach worker, 503 or log
//!         end
//!         Guard-->>Chain: Result
//!     end
//!     Chain-->>Dispatcher: Result / trapped panic
//!     Dispatcher->>Dispatcher: error handler (or last resort)
//!     Dispatcher->>Pool: release()
//!     Dispatcher-->>Transport: Response
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaycore::{from_fn, handler, Dispatcher, IncomingRequest, RouteTable, TimeoutGuard};
//! use http::{Method, StatusCode};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut routes = RouteTable::new();
//! routes.route(Method::GET, "/pets/{id}", handler(|ctx| {
//!     let id = ctx.param("id").unwrap_or_default();
//!     ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }));
//!
//! let mut dispatcher = Dispatcher::new(routes);
//! dispatcher.add_middleware(Arc::new(TimeoutGuard::new(Duration::from_secs(2))));
//!
//! let response = dispatcher.dispatch(IncomingRequest::new(Method::GET, "/pets/7"));
//! assert_eq!(response.status(), Some(StatusCode::OK));
//! ```
//!
//! ## Runtime
//!
//! Dispatch may run on plain threads or `may` coroutines. [`TimeoutGuard`] spawns its worker
//! as a `may` coroutine, so configure the runtime (`may::config()`) before serving traffic.
//! Release builds must keep `panic = "unwind"`: fault containment relies on unwinding.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod scope;
pub mod state;

pub use context::Context;
pub use dispatcher::{Dispatcher, IncomingRequest};
pub use error::{ApplicationError, Error, FaultError, MissingKeyFault, TimeoutError};
pub use ids::RequestId;
pub use middleware::{compose, from_fn, handler, Handler, Middleware, RequestSpan, TimeoutGuard};
pub use response::Response;
pub use router::{RouteLookup, RouteMatch, RouteMatcher, RouteTable};
pub use scope::{Scope, ScopeError};
pub use state::{RequestState, StatePool};
