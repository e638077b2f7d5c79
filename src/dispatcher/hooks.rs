//! Replaceable dispatcher hooks and their defaults.

use http::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::{ApplicationError, Error, FaultError};
use crate::middleware::{handler, Handler};
use crate::response::status_reason;
use crate::state::keys;

/// Converts a trapped fault into an error for the reporting path.
pub type FaultHandler = Arc<dyn Fn(&Context, FaultError) -> Result<(), Error> + Send + Sync>;

/// Translates an error into a response. Returning `Err` triggers the last-resort response.
pub type ErrorHandler = Arc<dyn Fn(&Context, &Error) -> Result<(), Error> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Hooks {
    pub(crate) fault: FaultHandler,
    pub(crate) error: ErrorHandler,
    pub(crate) not_found: Handler,
    pub(crate) method_not_allowed: Handler,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            fault: Arc::new(default_fault_handler),
            error: Arc::new(default_error_handler),
            not_found: handler(default_not_found),
            method_not_allowed: handler(default_method_not_allowed),
        }
    }
}

/// Render `err` as `{"status": .., "message": .., ...details}`.
///
/// Application errors keep their own status and message; every other kind gets the
/// canonical reason phrase of its status so internals never reach the client. `HEAD`
/// responses get the status and content type only.
pub fn default_error_handler(ctx: &Context, err: &Error) -> Result<(), Error> {
    let status = err.status();

    if status.is_server_error() {
        match err {
            Error::Fault(fault) => error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error_kind = err.kind(),
                panic_message = %fault.message(),
                "Request failed with a fault"
            ),
            Error::Application(app) => error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error_kind = err.kind(),
                error = %app,
                cause = ?app.cause().map(|c| c.to_string()),
                "Request failed"
            ),
            _ => error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error_kind = err.kind(),
                error = %err,
                "Request failed"
            ),
        }
    } else {
        debug!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            status = status.as_u16(),
            error_kind = err.kind(),
            error = %err,
            "Request rejected"
        );
    }

    ctx.set_header("content-type", "application/json");
    if *ctx.method() == Method::HEAD {
        ctx.write_header(status);
        return Ok(());
    }
    ctx.json(status, &error_body(err))
}

/// The JSON body [`default_error_handler`] sends.
#[must_use]
pub fn error_body(err: &Error) -> Value {
    let status = err.status();
    let mut body = Map::new();
    body.insert("status".to_string(), json!(status.as_u16()));

    match err {
        Error::Application(app) => {
            body.insert("message".to_string(), json!(app.message));
            match &app.details {
                Some(Value::Object(fields)) => {
                    for (k, v) in fields {
                        if k != "status" && k != "message" {
                            body.insert(k.clone(), v.clone());
                        }
                    }
                }
                Some(other) => {
                    body.insert("details".to_string(), other.clone());
                }
                None => {}
            }
        }
        _ => {
            body.insert("message".to_string(), json!(status_reason(status)));
        }
    }

    Value::Object(body)
}

/// Hand the fault to error reporting unchanged.
pub fn default_fault_handler(_ctx: &Context, fault: FaultError) -> Result<(), Error> {
    Err(Error::Fault(fault))
}

pub fn default_not_found(ctx: &Context) -> Result<(), Error> {
    Err(ApplicationError::not_found(format!("no route matches path {}", ctx.path())).into())
}

/// Reads the methods published under [`keys::ALLOWED_METHODS`].
pub fn default_method_not_allowed(ctx: &Context) -> Result<(), Error> {
    let allowed: Vec<String> = ctx
        .get_as::<Vec<Method>>(keys::ALLOWED_METHODS)
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect();
    Err(ApplicationError::method_not_allowed(format!(
        "method {} is not allowed for path {}",
        ctx.method(),
        ctx.path()
    ))
    .with_details(json!({ "allowed": allowed }))
    .into())
}

/// `Allow` header value for a 405.
pub(crate) fn allow_header(allowed: &[Method]) -> String {
    allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutError;
    use http::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_error_body_merges_object_details() {
        let err: Error = ApplicationError::new(StatusCode::BAD_REQUEST, "bad input")
            .with_details(json!({"field": "name", "status": 999}))
            .into();
        let body = error_body(&err);
        assert_eq!(body["status"], 400);
        assert_eq!(body["message"], "bad input");
        assert_eq!(body["field"], "name");
    }

    #[test]
    fn test_error_body_hides_internal_messages() {
        let err = Error::generic("db password was hunter2");
        let body = error_body(&err);
        assert_eq!(body["status"], 500);
        assert_eq!(body["message"], "Internal Server Error");

        let err: Error = TimeoutError::new(Duration::from_millis(5)).into();
        assert_eq!(error_body(&err)["message"], "Service Unavailable");
    }

    #[test]
    fn test_allow_header() {
        assert_eq!(allow_header(&[Method::GET, Method::POST]), "GET, POST");
        assert_eq!(allow_header(&[]), "");
    }
}
