//! Cancellation scopes.
//!
//! A [`Scope`] is a cancellable, deadline-capable token. The dispatcher creates a root scope
//! for every request; middleware such as [`TimeoutGuard`](crate::middleware::TimeoutGuard)
//! derive a narrower child instead of mutating the parent. Cancellation is cooperative:
//! handlers poll [`Scope::check`] (or [`Scope::remaining`]) at points where stopping is safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a scope is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
struct ScopeInner {
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    parent: Option<Scope>,
}

#[derive(Debug, Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl Scope {
    /// A scope with no deadline and no parent.
    #[must_use]
    pub fn root() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                deadline: None,
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Derive a child that expires `timeout` from now (or earlier, if the parent does).
    ///
    /// A timeout too large to represent as an `Instant` gives the child the parent's deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Scope, ScopeGuard) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(self.deadline()),
        }
    }

    /// Derive a child that expires at `deadline` (or earlier, if the parent does).
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Scope, ScopeGuard) {
        let effective = match self.deadline() {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.child(Some(effective))
    }

    fn child(&self, deadline: Option<Instant>) -> (Scope, ScopeGuard) {
        let child = Scope {
            inner: Arc::new(ScopeInner {
                deadline,
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        };
        let guard = ScopeGuard {
            scope: child.clone(),
        };
        (child, guard)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline; `None` when the scope has no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// `None` while the scope is live.
    #[must_use]
    pub fn err(&self) -> Option<ScopeError> {
        if matches!(self.inner.deadline, Some(d) if Instant::now() >= d) {
            return Some(ScopeError::DeadlineExceeded);
        }
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Some(ScopeError::Cancelled);
        }
        self.inner.parent.as_ref().and_then(Scope::err)
    }

    pub fn check(&self) -> Result<(), ScopeError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Closes a derived scope when dropped.
#[derive(Debug)]
pub struct ScopeGuard {
    scope: Scope,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_scope_is_live() {
        let root = Scope::root();
        assert!(root.err().is_none());
        assert!(root.deadline().is_none());
        assert!(root.remaining().is_none());
    }

    #[test]
    fn test_guard_closes_child_only() {
        let root = Scope::root();
        let (child, guard) = root.with_timeout(Duration::from_secs(30));
        assert!(child.check().is_ok());
        drop(guard);
        assert_eq!(child.err(), Some(ScopeError::Cancelled));
        assert!(root.err().is_none());
    }

    #[test]
    fn test_child_deadline_never_exceeds_parent() {
        let root = Scope::root();
        let (parent, _pg) = root.with_timeout(Duration::from_millis(50));
        let (child, _cg) = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_deadline_expiry_is_reported() {
        let (child, _guard) = Scope::root().with_timeout(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(child.check(), Err(ScopeError::DeadlineExceeded));
    }

    #[test]
    fn test_unrepresentable_timeout_inherits_parent_deadline() {
        let (unbounded, _g) = Scope::root().with_timeout(Duration::MAX);
        assert!(unbounded.deadline().is_none());
        assert!(unbounded.check().is_ok());

        let (parent, _pg) = Scope::root().with_timeout(Duration::from_secs(5));
        let (child, _cg) = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let root = Scope::root();
        let (child, _guard) = root.with_timeout(Duration::from_secs(30));
        root.cancel();
        assert_eq!(child.err(), Some(ScopeError::Cancelled));
    }
}
