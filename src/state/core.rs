//! Per-request mutable state.

use crate::dispatcher::IncomingRequest;
use crate::error::MissingKeyFault;
use crate::ids::RequestId;
use crate::middleware::Handler;
use crate::response::{HeaderVec, Response};
use crate::router::ParamVec;
use crate::scope::Scope;
use http::Method;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A value held in the request store.
pub type StoreValue = Arc<dyn Any + Send + Sync>;

/// Cursor value before the first chain layer runs.
pub const NOT_STARTED: usize = usize::MAX;

/// Well-known store keys written by the core.
pub mod keys {
    /// The [`Error`](crate::Error) handed to the global error handler
    pub const ERROR: &str = "relaycore.error";
    /// The [`FaultError`](crate::error::FaultError) of a trapped panic (payload and stack)
    pub const FAULT: &str = "relaycore.fault";
    /// `Vec<http::Method>` published before the method-not-allowed handler runs
    pub const ALLOWED_METHODS: &str = "relaycore.allowed_methods";
}

/// All mutable data scoped to one request.
///
/// The request metadata, `params` and `chain` are written by the dispatcher while it owns the
/// state exclusively and are read-only afterwards. The store and the response sit behind locks
/// because a [`TimeoutGuard`](crate::middleware::TimeoutGuard) worker may touch them while the
/// primary task is parked in its wait.
pub struct RequestState {
    request_id: RequestId,
    method: Method,
    path: String,
    query: ParamVec,
    headers: HeaderVec,
    body: Vec<u8>,
    params: ParamVec,
    store: RwLock<HashMap<String, StoreValue>>,
    response: Mutex<Response>,
    scope: Scope,
    chain: Option<Handler>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("store_len", &self.store.read().len())
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            method: Method::GET,
            path: String::new(),
            query: ParamVec::new(),
            headers: HeaderVec::new(),
            body: Vec::new(),
            params: ParamVec::new(),
            store: RwLock::new(HashMap::new()),
            response: Mutex::new(Response::new()),
            scope: Scope::root(),
            chain: None,
            cursor: AtomicUsize::new(NOT_STARTED),
        }
    }

    /// Prepare a pooled instance for a new owner: fresh id, fresh root scope.
    pub(crate) fn begin(&mut self) {
        self.request_id = RequestId::new();
        self.scope = Scope::root();
        *self.cursor.get_mut() = NOT_STARTED;
    }

    /// Copy the transport's request into this state.
    pub(crate) fn populate(&mut self, request: IncomingRequest) {
        let IncomingRequest {
            method,
            path,
            headers,
            body,
        } = request;

        if let Some(id) = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("x-request-id"))
            .map(|(_, v)| RequestId::from_header_or_new(Some(v.as_str())))
        {
            self.request_id = id;
        }

        let (route_path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path.as_str(), None),
        };
        self.path.clear();
        self.path.push_str(route_path);
        self.query.clear();
        if let Some(q) = query {
            self.query.extend(
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (Arc::<str>::from(&*k), v.into_owned())),
            );
        }

        self.method = method;
        self.headers = headers;
        self.body = body;
    }

    pub(crate) fn set_params(&mut self, params: ParamVec) {
        self.params = params;
    }

    pub(crate) fn set_chain(&mut self, chain: Handler) {
        self.chain = Some(chain);
    }

    /// Remove every trace of the previous request.
    ///
    /// Collections are emptied entry by entry (dropping the stored values); the scope and
    /// chain are replaced rather than cleared because they may still be referenced elsewhere.
    pub(crate) fn reset(&mut self) {
        self.method = Method::GET;
        self.path.clear();
        self.query.clear();
        self.headers.clear();
        self.body.clear();
        self.params.clear();
        self.store.get_mut().clear();
        self.response.get_mut().reset();
        self.scope = Scope::root();
        self.chain = None;
        *self.cursor.get_mut() = NOT_STARTED;
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a request header by name (case-insensitive per RFC 7230)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    /// Get a path parameter by name
    ///
    /// Uses "last write wins" semantics: if duplicate parameter names exist
    /// at different path depths, returns the last occurrence.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name ("last write wins" for repeated keys)
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// The root scope created when this state left the pool.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The composed chain for this request, once the dispatcher has built it.
    #[must_use]
    pub fn chain(&self) -> Option<&Handler> {
        self.chain.as_ref()
    }

    /// Deepest chain layer entered so far; `None` before the chain starts.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        match self.cursor.load(Ordering::Acquire) {
            NOT_STARTED => None,
            n => Some(n),
        }
    }

    /// Record that layer `step` was entered. The cursor never moves backwards.
    pub(crate) fn advance_cursor(&self, step: usize) {
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == NOT_STARTED || step > current {
                    Some(step)
                } else {
                    None
                }
            });
    }

    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.store.write().insert(key.into(), Arc::new(value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoreValue> {
        self.store.read().get(key).map(Arc::clone)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<StoreValue> {
        self.store.write().remove(key)
    }

    /// Like [`get`](Self::get) but raises a [`MissingKeyFault`] when the key is absent.
    #[must_use]
    pub fn must_get(&self, key: &str) -> StoreValue {
        match self.get(key) {
            Some(value) => value,
            None => std::panic::panic_any(MissingKeyFault {
                key: key.to_string(),
            }),
        }
    }

    /// Typed read. `None` both for an absent key and for a value of another type.
    #[must_use]
    pub fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
        // The lock is released when `get` returns; the downcast runs on the copied Arc.
        let value = self.get(key)?;
        value.downcast_ref::<T>().cloned()
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        let value = self.get(key)?;
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        value.downcast_ref::<&'static str>().map(|s| (*s).to_string())
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_as::<i64>(key)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_as::<bool>(key)
    }

    #[must_use]
    pub fn store_len(&self) -> usize {
        self.store.read().len()
    }

    pub(crate) fn response(&self) -> MutexGuard<'_, Response> {
        self.response.lock()
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.response.lock().is_committed()
    }

    /// Copy of the response as it stands now.
    #[must_use]
    pub fn response_snapshot(&self) -> Response {
        self.response.lock().clone()
    }
}
