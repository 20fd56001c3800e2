//! Call scope: cancellation and deadline carried through every routing call
//!
//! A `RoutingContext` is handed to every backend operation. It pairs a
//! cancellation token with an optional deadline. Child scopes inherit both:
//! cancelling a parent cancels every child, and a child's deadline is never
//! later than its parent's.

use crate::error::RoutingError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation scope for a single routing call
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RoutingContext {
    /// Create a background scope that is never done on its own
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child scope that shares this scope's deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child scope that expires `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child scope that expires at `at` (or earlier, if this scope does)
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= at => current,
            _ => at,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Deadline of this scope, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this scope and every scope derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this scope has been cancelled or has run past its deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The reason this scope is done, or `None` while it is still live
    pub fn err(&self) -> Option<RoutingError> {
        if self.token.is_cancelled() {
            return Some(RoutingError::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Some(RoutingError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until this scope is done and return why
    pub async fn done(&self) -> RoutingError {
        match self.deadline {
            Some(at) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => RoutingError::Cancelled,
                    _ = tokio::time::sleep_until(at) => RoutingError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                RoutingError::Cancelled
            }
        }
    }

    /// Guard that cancels this scope when dropped
    pub(crate) fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_outlives_parent() {
        let parent = RoutingContext::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(10));

        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.done().await, RoutingError::DeadlineExceeded);
        assert!(parent.is_done());
    }

    #[tokio::test]
    async fn test_cancel_propagates_downward_only() {
        let parent = RoutingContext::new();
        let child = parent.child();
        let sibling = parent.child();

        child.cancel();
        assert_eq!(child.err(), Some(RoutingError::Cancelled));
        assert!(!parent.is_done());
        assert!(!sibling.is_done());

        parent.cancel();
        assert_eq!(sibling.done().await, RoutingError::Cancelled);
    }

    #[tokio::test]
    async fn test_drop_guard_cancels_scope() {
        let scope = RoutingContext::new().child();
        {
            let _guard = scope.drop_guard();
        }
        assert!(scope.is_done());
    }

    #[test]
    fn test_background_scope_is_live() {
        let ctx = RoutingContext::new();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }
}
