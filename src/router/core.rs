use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::middleware::{Handler, Middleware};

/// Maximum number of path/query parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g., /users/{id}/posts/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage.
///
/// Param names use `Arc<str>`: path parameter names come from the route tree built at startup,
/// so handing one to a request is an atomic increment rather than a string copy. Values are
/// per-request data and stay `String`.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A successfully resolved route: the terminal handler, the middleware registered for it
/// (group middleware first), and the parameters extracted from the path.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: Handler,
    pub middlewares: Arc<[Arc<dyn Middleware>]>,
    pub path_params: ParamVec,
    /// The registered pattern, e.g. `/users/{id}`
    pub pattern: Arc<str>,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("path_params", &self.path_params)
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl RouteMatch {
    /// Get a path parameter by name
    ///
    /// Uses "last write wins" semantics: if duplicate parameter names exist
    /// at different path depths (e.g., `/org/{id}/team/{team_id}/user/{id}`),
    /// returns the last occurrence.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of asking a [`RouteMatcher`] about one request.
#[derive(Debug, Clone)]
pub enum RouteLookup {
    /// Path and method both matched.
    Matched(RouteMatch),
    /// The path is registered, but not for the requested method.
    MethodNotAllowed {
        /// Methods the path accepts, in registration order
        allowed: Vec<Method>,
    },
    /// Nothing is registered for the path.
    NotFound,
}

/// Resolves `(method, path)` to a handler. The dispatcher treats implementations as opaque.
pub trait RouteMatcher: Send + Sync {
    fn lookup(&self, method: &Method, path: &str) -> RouteLookup;
}

impl<T: RouteMatcher + ?Sized> RouteMatcher for Arc<T> {
    fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        (**self).lookup(method, path)
    }
}
