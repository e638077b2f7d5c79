use http::Method;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::hooks::{allow_header, Hooks};
use super::IncomingRequest;
use crate::context::Context;
use crate::error::{Error, FaultError};
use crate::fault::{self, Fault};
use crate::middleware::{compose, Handler, Middleware};
use crate::response::Response;
use crate::router::{RouteLookup, RouteMatcher};
use crate::runtime_config::RuntimeConfig;
use crate::state::{keys, RequestState, StatePool};

/// Routes requests, runs the composed chain under a fault trap and turns failures into
/// responses.
///
/// A `Dispatcher` is immutable once requests start flowing; share it as `Arc<Dispatcher>`
/// between the coroutines serving connections.
pub struct Dispatcher {
    matcher: Arc<dyn RouteMatcher>,
    middlewares: Vec<Arc<dyn Middleware>>,
    hooks: Hooks,
    pool: StatePool,
    config: RuntimeConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What [`Dispatcher::prepare`] hands back to `dispatch`.
struct Prepared {
    chain: Handler,
    depth: usize,
    allowed: Option<Vec<Method>>,
}

/// Returns the request state to the pool when dropped, on every exit path.
struct Lease<'a> {
    pool: &'a StatePool,
    state: Option<Arc<RequestState>>,
}

impl Lease<'_> {
    /// Share `state` for the duration of the chain and return the primary view over it.
    fn attach(&mut self, state: RequestState) -> Context {
        let state = Arc::new(state);
        let ctx = Context::new(Arc::clone(&state));
        self.state = Some(state);
        ctx
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.pool.release(state);
        }
    }
}

impl Dispatcher {
    /// Create a dispatcher configured from the environment.
    pub fn new(matcher: impl RouteMatcher + 'static) -> Self {
        Self::with_config(matcher, RuntimeConfig::from_env())
    }

    pub fn with_config(matcher: impl RouteMatcher + 'static, config: RuntimeConfig) -> Self {
        fault::install_hook();
        info!(
            pool_max_idle = config.pool_max_idle,
            pool_prewarm = config.pool_prewarm,
            "Dispatcher created"
        );
        Self {
            matcher: Arc::new(matcher),
            middlewares: Vec::new(),
            hooks: Hooks::default(),
            pool: StatePool::from_config(&config),
            config,
        }
    }

    /// Append global middleware. The first one added is the outermost layer, and global
    /// middleware also wraps the not-found and method-not-allowed handlers.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        debug!(middleware = middleware.name(), "Global middleware added");
        self.middlewares.push(middleware);
        self
    }

    pub fn set_fault_handler<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Context, FaultError) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.fault = Arc::new(f);
        self
    }

    pub fn set_error_handler<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Context, &Error) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.error = Arc::new(f);
        self
    }

    pub fn set_not_found_handler<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.not_found = Arc::new(f);
        self
    }

    pub fn set_method_not_allowed_handler<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.method_not_allowed = Arc::new(f);
        self
    }

    #[must_use]
    pub fn pool(&self) -> &StatePool {
        &self.pool
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Handle one request end to end and return the response to transmit.
    pub fn dispatch(&self, request: IncomingRequest) -> Response {
        let start = Instant::now();
        // Declared before the view so the view's reference is gone by the time the lease
        // releases the state.
        let mut lease = Lease {
            pool: &self.pool,
            state: None,
        };

        // Routing and composition call user code too, so they run under the trap and the
        // state is attached to the lease whatever they do.
        let mut state = self.pool.acquire();
        let prepared = fault::trap(|| self.prepare(&mut state, request));
        let ctx = lease.attach(state);

        let result = match prepared {
            Ok(Prepared {
                chain,
                depth,
                allowed,
            }) => {
                if let Some(allowed) = allowed {
                    ctx.set_header("allow", allow_header(&allowed));
                    ctx.set(keys::ALLOWED_METHODS, allowed);
                }

                debug!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    middleware_count = depth,
                    "Request dispatched"
                );

                match fault::trap(|| chain(&ctx)) {
                    Ok(result) => result,
                    Err(fault) => self.recover(&ctx, fault),
                }
            }
            Err(fault) => self.recover(&ctx, fault),
        };

        match result {
            Ok(()) => self.check_response(&ctx),
            Err(err) => self.report(&ctx, err),
        }

        let response = ctx.response();
        info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            status = response.status_or_default().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    /// Populate `state`, resolve the route and compose the chain for it.
    fn prepare(&self, state: &mut RequestState, request: IncomingRequest) -> Prepared {
        state.populate(request);

        let (terminal, route_middlewares, allowed) =
            match self.matcher.lookup(state.method(), state.path()) {
                RouteLookup::Matched(m) => {
                    state.set_params(m.path_params);
                    (m.handler, m.middlewares, None)
                }
                RouteLookup::MethodNotAllowed { allowed } => (
                    Arc::clone(&self.hooks.method_not_allowed),
                    Arc::from(Vec::new()),
                    Some(allowed),
                ),
                RouteLookup::NotFound => (
                    Arc::clone(&self.hooks.not_found),
                    Arc::from(Vec::new()),
                    None,
                ),
            };

        let chain = compose(&self.middlewares, &route_middlewares, terminal);
        state.set_chain(Arc::clone(&chain));
        Prepared {
            chain,
            depth: self.middlewares.len() + route_middlewares.len(),
            allowed,
        }
    }

    /// Record a trapped fault and run the fault handler, itself under a trap.
    fn recover(&self, ctx: &Context, fault: Fault) -> Result<(), Error> {
        let fault = fault.into_error();
        let chain_depth = ctx.state().cursor();
        error!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            chain_depth = ?chain_depth,
            error_kind = "fault",
            panic_message = %fault.message(),
            backtrace = %fault.backtrace(),
            "Handler panicked - CRITICAL"
        );
        ctx.set(keys::FAULT, fault.clone());

        match fault::trap(|| (self.hooks.fault)(ctx, fault)) {
            Ok(result) => result,
            Err(second) => {
                let second = second.into_error();
                error!(
                    request_id = %ctx.request_id(),
                    error_kind = "fault",
                    panic_message = %second.message(),
                    "Fault handler panicked"
                );
                Err(Error::Fault(second))
            }
        }
    }

    /// Send `err` through the error handler, or log it if the response is already out.
    fn report(&self, ctx: &Context, err: Error) {
        if ctx.is_committed() {
            warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                error_kind = err.kind(),
                error = %err,
                "Error after response was committed - response left unchanged"
            );
            return;
        }

        ctx.set(keys::ERROR, err.clone());
        let outcome = match fault::trap(|| (self.hooks.error)(ctx, &err)) {
            Ok(outcome) => outcome,
            Err(fault) => Err(Error::Fault(fault.into_error())),
        };

        match outcome {
            Err(handler_err) => {
                error!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    error_kind = "dispatch",
                    error = %err,
                    handler_error = %handler_err,
                    "Error handler failed - sending last-resort response"
                );
                ctx.write_last_resort();
            }
            Ok(()) if !ctx.is_committed() => {
                warn!(
                    request_id = %ctx.request_id(),
                    error_kind = err.kind(),
                    "Error handler returned without committing a response"
                );
            }
            Ok(()) => {}
        }
    }

    /// Warn about chains that succeeded without producing anything to send.
    fn check_response(&self, ctx: &Context) {
        if !self.config.warn_on_empty_response {
            return;
        }
        let expects_body = matches!(
            *ctx.method(),
            Method::GET | Method::POST | Method::PUT | Method::PATCH
        );
        if !expects_body {
            return;
        }
        let response = ctx.response();
        let looks_unwritten = match response.status() {
            None => true,
            Some(status) => status == http::StatusCode::OK && response.body().is_empty(),
        };
        if looks_unwritten {
            warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = ?response.status().map(|s| s.as_u16()),
                "Handler completed without writing a response"
            );
        }
    }
}
