//! # Error Model
//!
//! Every failure that reaches the dispatch boundary is an ordinary [`Error`] value:
//!
//! | Variant                  | Client sees                                   | Logged                  |
//! |--------------------------|-----------------------------------------------|-------------------------|
//! | [`Error::Application`]   | its own status and message, verbatim          | cause, when present     |
//! | [`Error::Generic`]       | `500 Internal Server Error`                   | full error chain        |
//! | [`Error::Fault`]         | `500 Internal Server Error`                   | panic payload + stack   |
//! | [`Error::Timeout`]       | `503 Service Unavailable`                     | the deadline signal     |
//!
//! A failure of the global error handler itself (a "dispatch error") never becomes a value:
//! the dispatcher writes a fixed plaintext 500 and logs it as critical.

use http::StatusCode;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shareable, type-erased error used as the internal cause of an [`ApplicationError`].
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An error with an explicit status and a client-facing message.
#[derive(Clone)]
pub struct ApplicationError {
    /// HTTP status sent to the client
    pub status: StatusCode,
    /// Message sent to the client
    pub message: String,
    /// Extra fields merged into the default JSON error body
    pub details: Option<Value>,
    cause: Option<BoxError>,
}

impl ApplicationError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Attach an internal cause. Causes are logged, never rendered to the client.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach extra JSON fields for the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationError")
            .field("status", &self.status.as_u16())
            .field("message", &self.message)
            .field("details", &self.details)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// A trapped panic, converted into a value once it crosses the dispatch boundary.
#[derive(Clone)]
pub struct FaultError {
    message: String,
    backtrace: Arc<Backtrace>,
}

impl FaultError {
    pub(crate) fn new(message: String, backtrace: Backtrace) -> Self {
        Self {
            message,
            backtrace: Arc::new(backtrace),
        }
    }

    /// Panic payload rendered as text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack captured at the panic site (or at the trap, when the panic site was unavailable).
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Debug for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultError")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecoverable fault: {}", self.message)
    }
}

impl std::error::Error for FaultError {}

/// The deadline signal raised when a [`TimeoutGuard`](crate::middleware::TimeoutGuard) expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {}ms exceeded", .timeout.as_millis())]
pub struct TimeoutError {
    /// The guard duration that elapsed
    pub timeout: Duration,
}

impl TimeoutError {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Panic payload raised by [`Context::must_get`](crate::Context::must_get) for an absent key.
///
/// This is a programmer error, not an expected failure path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("required store key {key:?} is not set")]
pub struct MissingKeyFault {
    pub key: String,
}

/// Any failure produced by a handler, middleware or hook.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Fault(#[from] FaultError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("{0}")]
    Generic(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Generic(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Generic(Arc::new(anyhow::Error::new(err)))
    }
}

impl Error {
    /// Build a generic (client-opaque) error from a message.
    pub fn generic(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Error::Generic(Arc::new(anyhow::Error::msg(message)))
    }

    /// Status the default error handler renders for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Application(app) => app.status,
            Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Fault(_) | Error::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label used in structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Application(_) => "application",
            Error::Fault(_) => "fault",
            Error::Timeout(_) => "timeout",
            Error::Generic(_) => "generic",
        }
    }
}
