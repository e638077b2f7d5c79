//! Request views.
//!
//! A [`Context`] is what handlers and middleware receive. It pairs the shared
//! [`RequestState`] with the cancellation [`Scope`] this particular view observes.
//! [`TimeoutGuard`](crate::middleware::TimeoutGuard) hands its worker a *derived* view: same
//! state, narrower scope, and its own detach flag so the guard can silence the worker's writes
//! once it has stopped waiting for it.

use crate::error::Error;
use crate::ids::RequestId;
use crate::middleware::Handler;
use crate::response::{HeaderVec, Response};
use crate::scope::Scope;
use crate::state::{RequestState, StoreValue};
use http::{Method, StatusCode};
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct ViewLink {
    detached: AtomicBool,
    parent: Option<Arc<ViewLink>>,
}

impl ViewLink {
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_detached())
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    state: Arc<RequestState>,
    scope: Scope,
    view: Arc<ViewLink>,
}

impl Context {
    /// Primary view over `state`, observing the state's root scope.
    #[must_use]
    pub fn new(state: Arc<RequestState>) -> Self {
        let scope = state.scope().clone();
        Self {
            state,
            scope,
            view: Arc::new(ViewLink::default()),
        }
    }

    /// A view over the same state that observes `scope` instead of this view's scope.
    #[must_use]
    pub fn derive(&self, scope: Scope) -> Self {
        Self {
            state: Arc::clone(&self.state),
            scope,
            view: Arc::new(ViewLink {
                detached: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.view)),
            }),
        }
    }

    /// Stop honouring response writes made through this view (and views derived from it).
    pub(crate) fn detach(&self) {
        self.view.detached.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.view.is_detached()
    }

    #[must_use]
    pub fn state(&self) -> &Arc<RequestState> {
        &self.state
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.state.request_id()
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        self.state.method()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.state.path()
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.state.param(name)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.state.query_param(name)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.state.header(name)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        self.state.headers()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.state.body()
    }

    #[must_use]
    pub fn chain(&self) -> Option<&Handler> {
        self.state.chain()
    }

    // Store

    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.state.set(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoreValue> {
        self.state.get(key)
    }

    #[must_use]
    pub fn must_get(&self, key: &str) -> StoreValue {
        self.state.must_get(key)
    }

    #[must_use]
    pub fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.state.get_as(key)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.state.get_string(key)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.state.get_int(key)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.state.get_bool(key)
    }

    // Response

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.state.is_committed()
    }

    #[must_use]
    pub fn response(&self) -> Response {
        self.state.response_snapshot()
    }

    /// Run `f` against the response unless this view is detached.
    fn with_response(&self, op: &'static str, f: impl FnOnce(&mut Response)) {
        let mut response = self.state.response();
        // Checked under the response lock so a guard that detaches us and then writes its
        // own response is strictly ordered with this write.
        if self.is_detached() {
            drop(response);
            debug!(
                request_id = %self.request_id(),
                op,
                "Discarding response write from detached task"
            );
            return;
        }
        f(&mut response);
    }

    pub fn set_status(&self, status: StatusCode) {
        self.with_response("set_status", |res| {
            res.set_status(status);
        });
    }

    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.with_response("set_header", |res| {
            res.set_header(name, value);
        });
    }

    pub fn append_header(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.with_response("append_header", |res| {
            res.append_header(name, value);
        });
    }

    /// Commit the status line and headers without a body.
    pub fn write_header(&self, status: StatusCode) {
        self.with_response("write_header", |res| {
            res.write_header(status);
        });
    }

    pub fn write(&self, bytes: &[u8]) {
        self.with_response("write", |res| res.write(bytes));
    }

    /// Send `body` as JSON with `status`.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, body: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(body)?;
        self.with_response("json", |res| {
            res.set_header("content-type", "application/json");
            res.write_header(status);
            res.write(&bytes);
        });
        Ok(())
    }

    /// Send `body` as UTF-8 plain text with `status`.
    pub fn text(&self, status: StatusCode, body: &str) -> Result<(), Error> {
        self.with_response("text", |res| {
            res.set_header("content-type", "text/plain; charset=utf-8");
            res.write_header(status);
            res.write(body.as_bytes());
        });
        Ok(())
    }

    /// Commit `status` with an empty body.
    pub fn no_content(&self, status: StatusCode) -> Result<(), Error> {
        self.write_header(status);
        Ok(())
    }

    /// Commit the fixed plaintext 500. Never fails; a no-op once committed.
    pub(crate) fn write_last_resort(&self) -> bool {
        self.state.response().write_last_resort()
    }
}
