//! Routing through the public surface: `RouteTable` lookups and a hand-written
//! `RouteMatcher` plugged into the dispatcher.

use http::{Method, StatusCode};
use relaycore::router::ParamVec;
use relaycore::runtime_config::RuntimeConfig;
use relaycore::{
    from_fn, handler, Dispatcher, Handler, IncomingRequest, RouteLookup, RouteMatch,
    RouteMatcher, RouteTable,
};
use serde_json::Value;
use std::sync::Arc;

mod common;
use common::test_runtime::setup_may_runtime;

fn ok(label: &'static str) -> Handler {
    handler(move |ctx| ctx.text(StatusCode::OK, label))
}

fn matched(table: &RouteTable, method: Method, path: &str) -> RouteMatch {
    match table.lookup(&method, path) {
        RouteLookup::Matched(m) => m,
        other => panic!("{method} {path}: expected a match, got {other:?}"),
    }
}

#[test]
fn test_static_segment_beats_parameter() {
    let mut table = RouteTable::new();
    table
        .route(Method::GET, "/pets/{id}", ok("by-id"))
        .route(Method::GET, "/pets/search", ok("search"));

    assert_eq!(&*matched(&table, Method::GET, "/pets/search").pattern, "/pets/search");
    let m = matched(&table, Method::GET, "/pets/42");
    assert_eq!(&*m.pattern, "/pets/{id}");
    assert_eq!(m.get_path_param("id"), Some("42"));
}

#[test]
fn test_backtracks_into_parameter_branch() {
    let mut table = RouteTable::new();
    table
        .route(Method::GET, "/files/static/index", ok("index"))
        .route(Method::GET, "/files/{bucket}/{name}", ok("object"));

    let m = matched(&table, Method::GET, "/files/static/logo.png");
    assert_eq!(&*m.pattern, "/files/{bucket}/{name}");
    assert_eq!(m.get_path_param("bucket"), Some("static"));
    assert_eq!(m.get_path_param("name"), Some("logo.png"));
}

#[test]
fn test_method_not_allowed_lists_registered_methods() {
    let mut table = RouteTable::new();
    table
        .route(Method::GET, "/orders/{id}", ok("get"))
        .route(Method::DELETE, "/orders/{id}", ok("delete"));

    match table.lookup(&Method::PUT, "/orders/9") {
        RouteLookup::MethodNotAllowed { allowed } => {
            assert_eq!(allowed, vec![Method::GET, Method::DELETE]);
        }
        other => panic!("expected 405, got {other:?}"),
    }
    assert!(matches!(
        table.lookup(&Method::GET, "/orders"),
        RouteLookup::NotFound
    ));
}

#[test]
fn test_nested_groups_carry_prefix_and_middleware() {
    setup_may_runtime();
    let tag = |label: &'static str| {
        from_fn(move |ctx, next| {
            ctx.append_header("x-layer", label);
            next(ctx)
        })
    };

    let mut table = RouteTable::new();
    {
        let mut api = table.group("/api").with(tag("api"));
        let mut v1 = api.group("/v1").with(tag("v1"));
        v1.route_with(Method::GET, "/status", vec![tag("route")], ok("up"));
    }
    assert_eq!(table.routes(), vec![(Method::GET, "/api/v1/status".to_string())]);

    let d = Dispatcher::with_config(table, RuntimeConfig::default());
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/api/v1/status"));
    assert_eq!(res.status(), Some(StatusCode::OK));
    let layers: Vec<_> = res
        .headers()
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("x-layer"))
        .map(|(_, v)| v.as_str())
        .collect();
    assert_eq!(layers, ["api", "v1", "route"]);
}

/// Resolves every path under `/echo/` to one handler, and rejects everything but GET.
struct EchoMatcher {
    handler: Handler,
}

impl RouteMatcher for EchoMatcher {
    fn lookup(&self, method: &Method, path: &str) -> RouteLookup {
        let Some(rest) = path.strip_prefix("/echo/") else {
            return RouteLookup::NotFound;
        };
        if method != Method::GET {
            return RouteLookup::MethodNotAllowed {
                allowed: vec![Method::GET],
            };
        }
        let mut params = ParamVec::new();
        params.push((Arc::from("rest"), rest.to_string()));
        RouteLookup::Matched(RouteMatch {
            handler: Arc::clone(&self.handler),
            middlewares: Arc::from(Vec::new()),
            path_params: params,
            pattern: Arc::from("/echo/*"),
        })
    }
}

#[test]
fn test_dispatcher_accepts_any_route_matcher() {
    setup_may_runtime();
    let matcher = EchoMatcher {
        handler: handler(|ctx| ctx.text(StatusCode::OK, ctx.param("rest").unwrap_or_default())),
    };
    let d = Dispatcher::with_config(matcher, RuntimeConfig::default());

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/echo/a/b/c"));
    assert_eq!(res.status(), Some(StatusCode::OK));
    assert_eq!(res.body(), b"a/b/c");

    let res = d.dispatch(IncomingRequest::new(Method::POST, "/echo/a"));
    assert_eq!(res.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
    assert_eq!(res.header("allow"), Some("GET"));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/other"));
    assert_eq!(res.status(), Some(StatusCode::NOT_FOUND));
    let body: Value = serde_json::from_slice(res.body()).expect("json body");
    assert!(body["message"].as_str().expect("message").contains("/other"));
}
