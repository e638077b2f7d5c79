//! # Timeout Guard
//!
//! [`TimeoutGuard`] races the rest of the chain against a deadline.
//!
//! ## How a guarded call runs
//!
//! 1. A child [`Scope`](crate::scope::Scope) expiring after the configured duration is
//!    derived from the caller's scope. Its [`ScopeGuard`](crate::scope::ScopeGuard) closes it
//!    on every exit path.
//! 2. A derived [`Context`] exposing that scope is built over the same request state.
//! 3. The rest of the chain runs on a fresh `may` coroutine. Its return value goes out on a
//!    result channel; a panic is trapped inside the coroutine and goes out on a fault channel.
//!    Both channels are unbounded, so a late send never blocks the coroutine.
//! 4. The calling task waits for the first of: a result, a fault, the deadline.
//!    - result: returned unchanged
//!    - fault: re-raised here, so the dispatcher's trap sees it as if there were no guard
//!    - deadline: the worker view is detached, then the *original* view decides: if the
//!      response is already committed only a warning is logged and the [`TimeoutError`] is
//!      returned; otherwise the timeout handler runs (default: `503` [`ApplicationError`]).
//!
//! When two outcomes are ready at once the priority is fault, then result, then deadline.
//!
//! ## Detached workers
//!
//! The worker is never killed. Cancellation is cooperative: handlers that poll
//! [`Context::scope`] stop early, others run to completion. Once the guard has resolved on the
//! deadline it never reads the channels again, and the worker's detached view drops any
//! response writes, so a late worker cannot alter what the client receives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use may::coroutine;
use may::sync::mpsc;
use tracing::{debug, error, warn};

use super::core::{Handler, Middleware};
use crate::context::Context;
use crate::error::{ApplicationError, Error, TimeoutError};
use crate::fault::{self, Fault};
use crate::runtime_config::RuntimeConfig;

/// Called on deadline expiry when the response is still uncommitted.
pub type TimeoutHandler = Arc<dyn Fn(&Context, TimeoutError) -> Result<(), Error> + Send + Sync>;

struct GuardInner {
    timeout: Duration,
    error_message: Option<String>,
    on_timeout: Option<TimeoutHandler>,
    stack_size: usize,
}

#[derive(Clone)]
pub struct TimeoutGuard {
    inner: Arc<GuardInner>,
}

impl std::fmt::Debug for TimeoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGuard")
            .field("timeout", &self.inner.timeout)
            .field("error_message", &self.inner.error_message)
            .field("custom_handler", &self.inner.on_timeout.is_some())
            .field("stack_size", &self.inner.stack_size)
            .finish()
    }
}

enum Outcome {
    Completed(Result<(), Error>),
    Faulted(Fault),
    Expired,
}

impl TimeoutGuard {
    /// Guard the rest of the chain with `timeout`. A zero duration disables the guard.
    ///
    /// The worker stack is sized from `RELAY_STACK_SIZE`, independently of any
    /// [`RuntimeConfig`] handed to the dispatcher; use [`stack_size`](Self::stack_size) to
    /// set it explicitly.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                timeout,
                error_message: None,
                on_timeout: None,
                stack_size: RuntimeConfig::from_env().stack_size,
            }),
        }
    }

    /// Client message used by the default timeout handler.
    #[must_use]
    pub fn error_message(self, message: impl Into<String>) -> Self {
        self.map_inner(|inner| inner.error_message = Some(message.into()))
    }

    /// Replace the default timeout handler.
    #[must_use]
    pub fn on_timeout<F>(self, handler: F) -> Self
    where
        F: Fn(&Context, TimeoutError) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.map_inner(|inner| inner.on_timeout = Some(Arc::new(handler)))
    }

    /// Stack size for the worker coroutine.
    #[must_use]
    pub fn stack_size(self, bytes: usize) -> Self {
        self.map_inner(|inner| inner.stack_size = bytes)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn map_inner(self, f: impl FnOnce(&mut GuardInner)) -> Self {
        let mut inner = GuardInner {
            timeout: self.inner.timeout,
            error_message: self.inner.error_message.clone(),
            on_timeout: self.inner.on_timeout.clone(),
            stack_size: self.inner.stack_size,
        };
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    fn run(&self, ctx: &Context, next: &Handler) -> Result<(), Error> {
        let timeout = self.inner.timeout;
        let (scope, _scope_guard) = ctx.scope().with_timeout(timeout);
        let deadline = scope.deadline();
        let worker_ctx = ctx.derive(scope);

        let (result_tx, result_rx) = mpsc::channel::<Result<(), Error>>();
        let (fault_tx, fault_rx) = mpsc::channel::<Fault>();

        let task_ctx = worker_ctx.clone();
        let task = Arc::clone(next);
        let request_id = ctx.request_id();

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure owns everything it touches (Arc'd state, cloned handler, channel
        // senders), is Send + 'static, and never uses thread-local storage across yields.
        let spawned = unsafe {
            coroutine::Builder::new()
                .name(format!("timeout-guard-{request_id}"))
                .stack_size(self.inner.stack_size)
                .spawn(move || {
                    let outcome = fault::trap(|| task(&task_ctx));
                    // The state must be unshared before the waiter can wake and release it.
                    drop(task_ctx);
                    match outcome {
                        Ok(result) => {
                            let _ = result_tx.send(result);
                        }
                        Err(fault) => {
                            // Fault first: dropping result_tx is what wakes the waiter.
                            let _ = fault_tx.send(fault);
                            drop(result_tx);
                        }
                    }
                })
        };

        if let Err(e) = spawned {
            error!(
                request_id = %request_id,
                error = %e,
                stack_size = self.inner.stack_size,
                "Failed to spawn timeout guard coroutine - CRITICAL"
            );
            return Err(Error::generic(format!(
                "failed to start guarded handler: {e}"
            )));
        }

        match Self::wait(&result_rx, &fault_rx, deadline) {
            Outcome::Completed(result) => result,
            Outcome::Faulted(fault) => {
                debug!(
                    request_id = %request_id,
                    message = %fault.message(),
                    "Re-raising fault from guarded handler"
                );
                fault::resume(fault)
            }
            Outcome::Expired => {
                worker_ctx.detach();
                self.expire(ctx)
            }
        }
    }

    /// The single blocking wait of the guard. `None` waits without a deadline.
    fn wait(
        result_rx: &mpsc::Receiver<Result<(), Error>>,
        fault_rx: &mpsc::Receiver<Fault>,
        deadline: Option<Instant>,
    ) -> Outcome {
        let received = match deadline {
            Some(deadline) => result_rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok(),
            None => result_rx.recv().ok(),
        };
        if let Some(result) = received {
            return Outcome::Completed(result);
        }
        // Woken by a disconnect (worker faulted) or by the deadline. Either way, look at the
        // fault channel first so a fault racing the deadline is never reported as a timeout.
        if let Ok(fault) = fault_rx.try_recv() {
            return Outcome::Faulted(fault);
        }
        if let Ok(result) = result_rx.try_recv() {
            return Outcome::Completed(result);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Outcome::Expired;
        }
        Outcome::Completed(Err(Error::generic(
            "guarded handler exited without reporting an outcome",
        )))
    }

    fn expire(&self, ctx: &Context) -> Result<(), Error> {
        let err = TimeoutError::new(self.inner.timeout);
        let timeout_ms = self.inner.timeout.as_millis() as u64;

        if ctx.is_committed() {
            warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                timeout_ms,
                "Timeout elapsed after the response was already committed"
            );
            return Err(err.into());
        }

        debug!(
            request_id = %ctx.request_id(),
            timeout_ms,
            "Guarded handler exceeded its deadline"
        );

        match &self.inner.on_timeout {
            Some(handler) => handler(ctx, err),
            None => Err(self.default_timeout_error(err).into()),
        }
    }

    fn default_timeout_error(&self, err: TimeoutError) -> ApplicationError {
        let message = match &self.inner.error_message {
            Some(message) => message.clone(),
            None => format!(
                "request timed out after {}ms",
                self.inner.timeout.as_millis()
            ),
        };
        ApplicationError::service_unavailable(message).with_cause(err)
    }
}

impl Middleware for TimeoutGuard {
    fn wrap(&self, next: Handler) -> Handler {
        if self.inner.timeout.is_zero() {
            return next;
        }
        let guard = self.clone();
        Arc::new(move |ctx: &Context| guard.run(ctx, &next))
    }

    fn name(&self) -> &'static str {
        "TimeoutGuard"
    }
}
