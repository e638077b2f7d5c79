use http::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::core::{ParamVec, RouteLookup, RouteMatch, RouteMatcher};
use super::radix::{segments, RadixNode, RouteEntry};
use crate::middleware::{Handler, Middleware};

/// In-memory [`RouteMatcher`] built from explicit registrations.
///
/// ```rust,ignore
/// let mut table = RouteTable::new();
/// table.route(Method::GET, "/health", handler(|ctx| ctx.text(StatusCode::OK, "ok")));
///
/// let mut api = table.group("/api/v1").with(from_fn(require_auth));
/// api.route(Method::GET, "/users/{id}", handler(get_user));
/// api.route_with(Method::POST, "/users", vec![audit.clone()], handler(create_user));
/// ```
#[derive(Default)]
pub struct RouteTable {
    root: RadixNode,
    len: usize,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes())
            .finish()
    }
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` on `pattern`. Re-registering the same method and
    /// pattern replaces the previous handler.
    pub fn route(&mut self, method: Method, pattern: &str, handler: Handler) -> &mut Self {
        self.insert(method, pattern, Vec::new(), handler);
        self
    }

    /// Like [`route`](Self::route), with route-specific middleware (first is outermost).
    pub fn route_with(
        &mut self,
        method: Method,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Handler,
    ) -> &mut Self {
        self.insert(method, pattern, middlewares, handler);
        self
    }

    /// Start a group of routes sharing `prefix` and, optionally, middleware.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            table: self,
            prefix: normalize(prefix),
            middlewares: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All registered `(method, pattern)` pairs.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut out = Vec::with_capacity(self.len);
        self.root.for_each_route(&mut |method, entry| {
            out.push((method.clone(), entry.pattern.to_string()));
        });
        out
    }

    fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Handler,
    ) {
        let pattern = normalize(pattern);
        let entry = Arc::new(RouteEntry {
            handler,
            middlewares: Arc::from(middlewares),
            pattern: Arc::from(pattern.as_str()),
        });
        let replaced = self.root.insert(&segments(&pattern), method.clone(), entry);
        if replaced.is_some() {
            warn!(
                method = %method,
                pattern = %pattern,
                "Route registered twice - previous handler replaced"
            );
        } else {
            self.len += 1;
            info!(method = %method, pattern = %pattern, "Route registered");
        }
    }
}

impl RouteMatcher for RouteTable {
    fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        let match_start = Instant::now();
        let segs = segments(path);
        let mut params = ParamVec::new();

        let lookup = match self.root.search(&segs, method, &mut params) {
            Some(entry) => RouteLookup::Matched(RouteMatch {
                handler: Arc::clone(&entry.handler),
                middlewares: Arc::clone(&entry.middlewares),
                path_params: params,
                pattern: Arc::clone(&entry.pattern),
            }),
            None => {
                let mut allowed = Vec::new();
                self.root.allowed_methods(&segs, &mut allowed);
                if allowed.is_empty() {
                    RouteLookup::NotFound
                } else {
                    RouteLookup::MethodNotAllowed { allowed }
                }
            }
        };

        let match_duration = match_start.elapsed();
        if match_duration > Duration::from_millis(1) {
            warn!(
                method = %method,
                path = %path,
                duration_us = match_duration.as_micros() as u64,
                "Slow route matching detected"
            );
        }

        match &lookup {
            RouteLookup::Matched(m) => debug!(
                method = %method,
                path = %path,
                route_pattern = %m.pattern,
                path_params = ?m.path_params,
                "Route matched"
            ),
            RouteLookup::MethodNotAllowed { allowed } => debug!(
                method = %method,
                path = %path,
                allowed = ?allowed,
                "Path matched under other methods"
            ),
            RouteLookup::NotFound => debug!(method = %method, path = %path, "No route matched"),
        }

        lookup
    }
}

/// Routes registered under a shared prefix and middleware list.
///
/// Group middleware wraps outside route-specific middleware. Nested groups inherit the
/// parent's prefix and middleware.
pub struct RouteGroup<'a> {
    table: &'a mut RouteTable,
    prefix: String,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl RouteGroup<'_> {
    /// Append group middleware.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn route(&mut self, method: Method, pattern: &str, handler: Handler) -> &mut Self {
        self.route_with(method, pattern, Vec::new(), handler)
    }

    pub fn route_with(
        &mut self,
        method: Method,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Handler,
    ) -> &mut Self {
        let full = join(&self.prefix, pattern);
        let mut chain = self.middlewares.clone();
        chain.extend(middlewares);
        self.table.insert(method, &full, chain, handler);
        self
    }

    /// A nested group under this one.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            prefix: join(&self.prefix, prefix),
            middlewares: self.middlewares.clone(),
            table: &mut *self.table,
        }
    }
}

/// Leading slash, no trailing slash (except for the root itself).
fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join(prefix: &str, pattern: &str) -> String {
    let pattern = pattern.trim_matches('/');
    if pattern.is_empty() {
        return normalize(prefix);
    }
    normalize(&format!("{}/{}", prefix.trim_end_matches('/'), pattern))
}
