use std::sync::Arc;
use std::time::Instant;

use tracing::{field, info_span};

use super::core::{Handler, Middleware};
use crate::context::Context;

/// Opens a `request` span around the rest of the chain and records the final status and
/// latency on it.
///
/// Register it first so every other layer and the handler log inside the span. The
/// dispatcher's error and fault reporting runs after the chain returns, outside the span.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestSpan;

impl Middleware for RequestSpan {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |ctx: &Context| {
            let span = info_span!(
                "request",
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = field::Empty,
                latency_ms = field::Empty,
            );
            let start = Instant::now();
            let result = span.in_scope(|| next(ctx));

            let status = match &result {
                Ok(()) => ctx.response().status_or_default().as_u16(),
                Err(err) => err.status().as_u16(),
            };
            span.record("status", status);
            span.record("latency_ms", start.elapsed().as_millis() as u64);
            result
        })
    }

    fn name(&self) -> &'static str {
        "RequestSpan"
    }
}
