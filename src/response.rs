//! Buffered response surface.
//!
//! The transport owns the socket; this core only records what should be sent. The point
//! of no return is the *commit*: once [`Response::write_header`] has run (explicitly or via
//! the first [`Response::write`]) the status line and headers are considered on the wire and
//! can no longer change.

use http::StatusCode;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::warn;

/// Maximum inline headers before heap allocation
/// Most responses have ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path
///
/// Header names use `Arc<str>` so repeated well-known names clone in O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

pub(crate) const LAST_RESORT_BODY: &[u8] = b"Internal Server Error";

#[must_use]
pub fn status_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderVec,
    body: Vec<u8>,
    committed: bool,
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status set so far; `None` means no handler has chosen one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Status the transport should send (200 when nothing was set).
    #[must_use]
    pub fn status_or_default(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a header by name (case-insensitive per RFC 7230)
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
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns `false` (and changes nothing) once committed.
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.committed {
            warn!(status = status.as_u16(), "status change after commit ignored");
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Replace a header. Returns `false` (and changes nothing) once committed.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.committed {
            warn!(header = name, "header change after commit ignored");
            return false;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
        true
    }

    /// Add a header value without removing existing ones.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.committed {
            warn!(header = name, "header change after commit ignored");
            return false;
        }
        self.headers.push((Arc::from(name), value.into()));
        true
    }

    /// Commit the status line and headers. A second call is a no-op.
    pub fn write_header(&mut self, status: StatusCode) -> bool {
        if self.committed {
            warn!(
                status = status.as_u16(),
                previous = self.status_or_default().as_u16(),
                "response already committed"
            );
            return false;
        }
        self.status = Some(status);
        self.committed = true;
        true
    }

    /// Append body bytes, committing with the current status (or 200) first if needed.
    pub fn write(&mut self, bytes: &[u8]) {
        if !self.committed {
            let status = self.status_or_default();
            self.status = Some(status);
            self.committed = true;
        }
        self.body.extend_from_slice(bytes);
    }

    /// Commit a fixed plaintext 500. Cannot fail; does nothing if already committed.
    pub(crate) fn write_last_resort(&mut self) -> bool {
        if self.committed {
            return false;
        }
        self.headers.clear();
        self.headers.push((
            Arc::from("content-type"),
            "text/plain; charset=utf-8".to_string(),
        ));
        self.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
        self.committed = true;
        self.body.clear();
        self.body.extend_from_slice(LAST_RESORT_BODY);
        true
    }

    /// Remove every header and body byte, returning to the uncommitted state.
    pub(crate) fn reset(&mut self) {
        self.status = None;
        self.headers.clear();
        self.body.clear();
        self.committed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(StatusCode::OK), "OK");
        assert_eq!(status_reason(StatusCode::NOT_FOUND), "Not Found");
    }

    #[test]
    fn test_write_commits_with_default_status() {
        let mut res = Response::new();
        assert!(!res.is_committed());
        res.write(b"hello");
        assert!(res.is_committed());
        assert_eq!(res.status(), Some(StatusCode::OK));
        assert_eq!(res.body(), b"hello");
    }

    #[test]
    fn test_headers_frozen_after_commit() {
        let mut res = Response::new();
        assert!(res.set_header("Content-Type", "application/json"));
        assert!(res.write_header(StatusCode::CREATED));
        assert!(!res.set_header("x-late", "1"));
        assert!(!res.set_status(StatusCode::BAD_REQUEST));
        assert!(!res.write_header(StatusCode::ACCEPTED));
        assert_eq!(res.status(), Some(StatusCode::CREATED));
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.header("x-late"), None);
    }

    #[test]
    fn test_last_resort_only_when_uncommitted() {
        let mut res = Response::new();
        res.set_header("x-partial", "1");
        assert!(res.write_last_resort());
        assert_eq!(res.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(res.body(), LAST_RESORT_BODY);
        assert_eq!(res.header("x-partial"), None);
        assert!(!res.write_last_resort());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut res = Response::new();
        res.set_header("set-cookie", "session=secret");
        res.write(b"private");
        res.reset();
        assert!(!res.is_committed());
        assert!(res.headers().is_empty());
        assert!(res.body().is_empty());
        assert_eq!(res.status(), None);
    }
}
