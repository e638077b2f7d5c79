//! Radix tree used by [`RouteTable`](super::RouteTable).
//!
//! The tree is built by splitting paths into segments:
//! - Each node represents a path segment
//! - Static segments (e.g., `users`) match exactly and are always tried first
//! - Parameter segments (e.g., `{id}`) match any single segment
//! - Routes are stored at terminal nodes, keyed by HTTP method in registration order
//!
//! Lookup is O(k) in the number of path segments, with backtracking when a static branch
//! matches the prefix but not the rest of the path.

use http::Method;
use std::sync::Arc;

use super::ParamVec;
use crate::middleware::{Handler, Middleware};

/// A registered route: everything the dispatcher needs once the path has matched.
pub(crate) struct RouteEntry {
    pub(crate) handler: Handler,
    pub(crate) middlewares: Arc<[Arc<dyn Middleware>]>,
    pub(crate) pattern: Arc<str>,
}

#[derive(Default)]
pub(crate) struct RadixNode {
    /// The path segment this node represents (empty for the root and for parameter nodes)
    segment: Box<str>,
    /// Parameter name if this segment is a path parameter (e.g., "{id}" -> Some("id"))
    param_name: Option<Arc<str>>,
    /// Routes terminating here, in registration order
    routes: Vec<(Method, Arc<RouteEntry>)>,
    children: Vec<RadixNode>,
    /// Multiple parameter children are supported to handle routes with different parameter
    /// names at the same position (e.g., /users/{id}/posts vs /users/{user_id}/comments)
    param_children: Vec<RadixNode>,
}

/// Split a path into its non-empty segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty())
}

impl RadixNode {
    fn new_static(segment: &str) -> Self {
        Self {
            segment: segment.into(),
            ..Self::default()
        }
    }

    fn new_param(name: &str) -> Self {
        Self {
            param_name: Some(Arc::from(name)),
            ..Self::default()
        }
    }

    /// Insert a route. Returns the entry it replaced, if the same method and path were
    /// already registered.
    pub(crate) fn insert(
        &mut self,
        segments: &[&str],
        method: Method,
        entry: Arc<RouteEntry>,
    ) -> Option<Arc<RouteEntry>> {
        let Some((&segment, remaining)) = segments.split_first() else {
            if let Some(slot) = self.routes.iter_mut().find(|(m, _)| *m == method) {
                return Some(std::mem::replace(&mut slot.1, entry));
            }
            self.routes.push((method, entry));
            return None;
        };

        if let Some(name) = param_name(segment) {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(name))
            {
                return child.insert(remaining, method, entry);
            }
            let mut child = RadixNode::new_param(name);
            let replaced = child.insert(remaining, method, entry);
            self.param_children.push(child);
            return replaced;
        }

        if let Some(child) = self
            .children
            .iter_mut()
            .find(|c| &*c.segment == segment)
        {
            return child.insert(remaining, method, entry);
        }
        let mut child = RadixNode::new_static(segment);
        let replaced = child.insert(remaining, method, entry);
        self.children.push(child);
        replaced
    }

    /// Find the route for `method`, preferring static segments over parameters at every depth.
    pub(crate) fn search(
        &self,
        segments: &[&str],
        method: &Method,
        params: &mut ParamVec,
    ) -> Option<Arc<RouteEntry>> {
        let Some((&segment, remaining)) = segments.split_first() else {
            return self
                .routes
                .iter()
                .find(|(m, _)| m == method)
                .map(|(_, entry)| Arc::clone(entry));
        };

        for child in self.children.iter().filter(|c| &*c.segment == segment) {
            if let Some(entry) = child.search(remaining, method, params) {
                return Some(entry);
            }
        }

        for child in &self.param_children {
            if let Some(name) = &child.param_name {
                params.push((Arc::clone(name), segment.to_string()));
                if let Some(entry) = child.search(remaining, method, params) {
                    return Some(entry);
                }
                // Backtrack
                params.pop();
            }
        }

        None
    }

    /// Collect every method registered for a path, across all branches that match it.
    pub(crate) fn allowed_methods(&self, segments: &[&str], allowed: &mut Vec<Method>) {
        let Some((&segment, remaining)) = segments.split_first() else {
            for (method, _) in &self.routes {
                if !allowed.contains(method) {
                    allowed.push(method.clone());
                }
            }
            return;
        };

        for child in self.children.iter().filter(|c| &*c.segment == segment) {
            child.allowed_methods(remaining, allowed);
        }
        for child in &self.param_children {
            child.allowed_methods(remaining, allowed);
        }
    }

    /// Visit every registered `(method, pattern)` pair.
    pub(crate) fn for_each_route(&self, f: &mut impl FnMut(&Method, &RouteEntry)) {
        for (method, entry) in &self.routes {
            f(method, entry);
        }
        for child in self.children.iter().chain(self.param_children.iter()) {
            child.for_each_route(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler;

    fn entry(pattern: &str) -> Arc<RouteEntry> {
        Arc::new(RouteEntry {
            handler: handler(|_| Ok(())),
            middlewares: Arc::from(Vec::new()),
            pattern: Arc::from(pattern),
        })
    }

    fn tree(routes: &[(Method, &str)]) -> RadixNode {
        let mut root = RadixNode::default();
        for (method, pattern) in routes {
            root.insert(&segments(pattern), method.clone(), entry(pattern));
        }
        root
    }

    fn find(root: &RadixNode, method: Method, path: &str) -> Option<(String, ParamVec)> {
        let mut params = ParamVec::new();
        root.search(&segments(path), &method, &mut params)
            .map(|e| (e.pattern.to_string(), params))
    }

    #[test]
    fn test_static_preferred_over_param() {
        let root = tree(&[(Method::GET, "/users/{id}"), (Method::GET, "/users/me")]);
        let (pattern, params) = find(&root, Method::GET, "/users/me").expect("match");
        assert_eq!(pattern, "/users/me");
        assert!(params.is_empty());

        let (pattern, params) = find(&root, Method::GET, "/users/42").expect("match");
        assert_eq!(pattern, "/users/{id}");
        assert_eq!(params[0].1, "42");
    }

    #[test]
    fn test_backtracks_out_of_static_branch() {
        let root = tree(&[
            (Method::GET, "/files/static/index"),
            (Method::GET, "/files/{name}/raw"),
        ]);
        let (pattern, params) = find(&root, Method::GET, "/files/static/raw").expect("match");
        assert_eq!(pattern, "/files/{name}/raw");
        assert_eq!(params.len(), 1);
        assert_eq!(&*params[0].0, "name");
    }

    #[test]
    fn test_different_param_names_same_position() {
        let root = tree(&[
            (Method::GET, "/users/{user_id}/posts"),
            (Method::GET, "/users/{id}/comments"),
        ]);
        let (_, params) = find(&root, Method::GET, "/users/7/comments").expect("match");
        assert_eq!(params.len(), 1);
        assert_eq!(&*params[0].0, "id");
    }

    #[test]
    fn test_allowed_methods_in_registration_order() {
        let root = tree(&[
            (Method::PUT, "/items/{id}"),
            (Method::DELETE, "/items/{id}"),
            (Method::GET, "/items/special"),
        ]);
        let mut allowed = Vec::new();
        root.allowed_methods(&segments("/items/special"), &mut allowed);
        assert_eq!(allowed, vec![Method::GET, Method::PUT, Method::DELETE]);
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut root = tree(&[(Method::GET, "/a")]);
        let replaced = root.insert(&segments("/a"), Method::GET, entry("/a"));
        assert!(replaced.is_some());
    }
}
