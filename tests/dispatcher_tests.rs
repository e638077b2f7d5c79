//! Tests for request dispatch: routing outcomes, middleware order, fault recovery and error
//! reporting.
//!
//! Every test drives the public [`Dispatcher::dispatch`] entry point with an
//! [`IncomingRequest`] and inspects the returned [`Response`], the way a transport would.

use http::{Method, StatusCode};
use parking_lot::Mutex;
use relaycore::dispatcher::default_error_handler;
use relaycore::error::{ApplicationError, Error, FaultError};
use relaycore::runtime_config::RuntimeConfig;
use relaycore::state::keys;
use relaycore::{from_fn, handler, Dispatcher, IncomingRequest, Middleware, RouteTable};
use serde_json::Value;
use std::sync::Arc;

mod common;
use common::log_capture::LogCapture;

fn dispatcher(table: RouteTable) -> Dispatcher {
    Dispatcher::with_config(table, RuntimeConfig::default())
}

fn json_body(res: &relaycore::Response) -> Value {
    serde_json::from_slice(res.body()).expect("json body")
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Middleware> {
    let log = Arc::clone(log);
    from_fn(move |ctx, next| {
        log.lock().push(format!("{name}:in"));
        let result = next(ctx);
        log.lock().push(format!("{name}:out"));
        result
    })
}

#[test]
fn test_onion_order_global_then_route() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);

    let mut table = RouteTable::new();
    {
        let mut group = table.group("/api").with(recorder(&log, "group"));
        group.route_with(
            Method::GET,
            "/items",
            vec![recorder(&log, "route")],
            handler(move |ctx| {
                handler_log.lock().push("handler".to_string());
                ctx.text(StatusCode::OK, "items")
            }),
        );
    }

    let mut d = dispatcher(table);
    d.add_middleware(recorder(&log, "global0"))
        .add_middleware(recorder(&log, "global1"));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/api/items"));
    assert_eq!(res.status(), Some(StatusCode::OK));
    assert_eq!(
        *log.lock(),
        vec![
            "global0:in",
            "global1:in",
            "group:in",
            "route:in",
            "handler",
            "route:out",
            "group:out",
            "global1:out",
            "global0:out",
        ]
    );
}

#[test]
fn test_unregistered_path_is_404_naming_the_path() {
    let d = dispatcher(RouteTable::new());
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/no/such/thing"));

    assert_eq!(res.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(res.header("content-type"), Some("application/json"));
    let body = json_body(&res);
    assert_eq!(body["status"], 404);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("/no/such/thing"));
}

#[test]
fn test_wrong_method_is_405_with_allowed_methods() {
    let mut table = RouteTable::new();
    table.route(Method::POST, "/orders", handler(|ctx| ctx.no_content(StatusCode::CREATED)));
    let d = dispatcher(table);

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/orders"));
    assert_eq!(res.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
    assert_eq!(res.header("allow"), Some("POST"));
    let body = json_body(&res);
    assert_eq!(body["allowed"], serde_json::json!(["POST"]));
}

#[test]
fn test_global_middleware_wraps_not_found() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut d = dispatcher(RouteTable::new());
    d.add_middleware(recorder(&log, "global"));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/missing"));
    assert_eq!(res.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(*log.lock(), vec!["global:in", "global:out"]);
}

#[test]
fn test_custom_not_found_handler() {
    let mut d = dispatcher(RouteTable::new());
    d.set_not_found_handler(|ctx| ctx.text(StatusCode::NOT_FOUND, "nothing here"));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/x"));
    assert_eq!(res.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(res.body(), b"nothing here");
}

#[test]
fn test_application_error_reaches_client_verbatim() {
    let mut table = RouteTable::new();
    table.route(
        Method::PUT,
        "/users/{id}",
        handler(|ctx| {
            Err(ApplicationError::new(
                StatusCode::CONFLICT,
                format!("user {} is locked", ctx.param("id").unwrap_or_default()),
            )
            .with_details(serde_json::json!({"retry_after": 30}))
            .into())
        }),
    );
    let d = dispatcher(table);

    let res = d.dispatch(IncomingRequest::new(Method::PUT, "/users/7"));
    assert_eq!(res.status(), Some(StatusCode::CONFLICT));
    let body = json_body(&res);
    assert_eq!(body["message"], "user 7 is locked");
    assert_eq!(body["retry_after"], 30);
}

#[test]
fn test_generic_error_is_normalized() {
    let mut table = RouteTable::new();
    table.route(
        Method::GET,
        "/db",
        handler(|_| Err(anyhow::anyhow!("connection refused: 10.0.0.3:5432").into())),
    );
    let d = dispatcher(table);

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/db"));
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let body = String::from_utf8_lossy(res.body()).into_owned();
    assert!(!body.contains("10.0.0.3"));
    assert!(body.contains("Internal Server Error"));
}

#[test]
fn test_panic_is_trapped_and_reported_as_fault() {
    let seen: Arc<Mutex<Option<(String, bool)>>> = Arc::new(Mutex::new(None));
    let seen_in_handler = Arc::clone(&seen);

    let mut table = RouteTable::new();
    table.route(
        Method::GET,
        "/explode",
        handler(|_| panic!("widget cache corrupted")),
    );
    let mut d = dispatcher(table);
    d.set_error_handler(move |ctx, err| {
        let stored = ctx.get_as::<FaultError>(keys::FAULT);
        *seen_in_handler.lock() = Some((err.kind().to_string(), stored.is_some()));
        default_error_handler(ctx, err)
    });

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/explode"));
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let body = String::from_utf8_lossy(res.body()).into_owned();
    assert!(!body.contains("widget cache"));

    let (kind, stored) = seen.lock().clone().expect("error handler ran");
    assert_eq!(kind, "fault");
    assert!(stored);
    assert_eq!(d.pool().metrics().get_in_flight(), 0);
}

#[test]
fn test_fault_handler_can_translate_fault() {
    let mut table = RouteTable::new();
    table.route(Method::GET, "/p", handler(|_| panic!("bad state")));
    let mut d = dispatcher(table);
    d.set_fault_handler(|_, fault| {
        Err(ApplicationError::new(StatusCode::BAD_GATEWAY, "upstream fault")
            .with_cause(fault)
            .into())
    });

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/p"));
    assert_eq!(res.status(), Some(StatusCode::BAD_GATEWAY));
    assert_eq!(json_body(&res)["message"], "upstream fault");
}

#[test]
fn test_missing_store_key_is_a_fault() {
    let mut table = RouteTable::new();
    table.route(
        Method::GET,
        "/needs-user",
        handler(|ctx| {
            let _user = ctx.must_get("user");
            ctx.text(StatusCode::OK, "unreachable")
        }),
    );
    let d = dispatcher(table);

    let (logs, _guard) = LogCapture::install();
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/needs-user"));
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(logs.contains("required store key \"user\" is not set"));
}

#[test]
fn test_failing_error_handler_gets_last_resort_response() {
    let mut table = RouteTable::new();
    table.route(Method::GET, "/e", handler(|_| Err(Error::generic("first failure"))));
    let mut d = dispatcher(table);
    d.set_error_handler(|_, _| Err(Error::generic("second failure")));

    let (logs, _guard) = LogCapture::install();
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/e"));

    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(res.body(), b"Internal Server Error");
    assert!(logs.contains("error_kind=\"dispatch\""));
    assert!(logs.contains("second failure"));
}

#[test]
fn test_error_after_commit_is_only_logged() {
    let mut table = RouteTable::new();
    table.route(
        Method::GET,
        "/partial",
        handler(|ctx| {
            ctx.text(StatusCode::OK, "partial")?;
            Err(Error::generic("failed after writing"))
        }),
    );
    let d = dispatcher(table);

    let (logs, _guard) = LogCapture::install();
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/partial"));

    assert_eq!(res.status(), Some(StatusCode::OK));
    assert_eq!(res.body(), b"partial");
    assert!(logs.contains("Error after response was committed"));
}

#[test]
fn test_empty_response_warning() {
    let mut table = RouteTable::new();
    table.route(Method::GET, "/silent", handler(|_| Ok(())));
    table.route(Method::DELETE, "/silent", handler(|_| Ok(())));
    let d = dispatcher(table);

    let (logs, _guard) = LogCapture::install();
    let res = d.dispatch(IncomingRequest::new(Method::DELETE, "/silent"));
    assert_eq!(res.status(), None);
    assert!(!logs.contains("Handler completed without writing a response"));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/silent"));
    assert_eq!(res.status(), None);
    assert!(logs.contains("Handler completed without writing a response"));
}

#[test]
fn test_request_id_header_is_honoured() {
    let mut table = RouteTable::new();
    table.route(
        Method::GET,
        "/id",
        handler(|ctx| ctx.text(StatusCode::OK, &ctx.request_id().to_string())),
    );
    let d = dispatcher(table);

    let id = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    let res = d.dispatch(IncomingRequest::new(Method::GET, "/id").with_header("X-Request-ID", id));
    assert_eq!(res.body(), id.as_bytes());
}

#[test]
fn test_short_circuit_middleware() {
    let mut table = RouteTable::new();
    table.route(Method::GET, "/admin", handler(|ctx| ctx.text(StatusCode::OK, "secret")));
    let mut d = dispatcher(table);
    d.add_middleware(from_fn(|ctx, next| {
        if ctx.header("authorization").is_none() {
            return Err(ApplicationError::new(StatusCode::UNAUTHORIZED, "missing credentials").into());
        }
        next(ctx)
    }));

    let res = d.dispatch(IncomingRequest::new(Method::GET, "/admin"));
    assert_eq!(res.status(), Some(StatusCode::UNAUTHORIZED));

    let res = d.dispatch(
        IncomingRequest::new(Method::GET, "/admin").with_header("Authorization", "Bearer t"),
    );
    assert_eq!(res.body(), b"secret");
}

#[test]
fn test_request_body_reaches_handler() {
    let mut table = RouteTable::new();
    table.route(
        Method::POST,
        "/echo",
        handler(|ctx| {
            let v: Value = serde_json::from_slice(ctx.body())?;
            ctx.json(StatusCode::CREATED, &v)
        }),
    );
    let d = dispatcher(table);

    let res = d.dispatch(IncomingRequest::new(Method::POST, "/echo").with_body(r#"{"a":1}"#));
    assert_eq!(res.status(), Some(StatusCode::CREATED));
    assert_eq!(json_body(&res)["a"], 1);

    let res = d.dispatch(IncomingRequest::new(Method::POST, "/echo").with_body("not json"));
    assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}
