//! Router entries: a backend paired with its scheduling and error policy
//!
//! Entries are immutable once built and are cloned (cheaply, the backend is
//! behind an `Arc`) into every task that runs them.

use super::contract::ContentRouting;
use crate::context::RoutingContext;
use crate::error::RoutingError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to an entry when none is configured
pub const DEFAULT_ROUTER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Entry of a parallel composition
#[derive(Clone)]
pub struct ParallelRouter {
    /// The backend this entry drives
    pub router: Arc<dyn ContentRouting>,
    /// Time allotted once the backend has been started
    pub timeout: Duration,
    /// Failures of this entry never affect the aggregate outcome
    pub ignore_error: bool,
    /// Delay, relative to call start, before the backend is invoked
    pub execute_after: Duration,
}

impl ParallelRouter {
    pub fn new(router: Arc<dyn ContentRouting>) -> Self {
        Self {
            router,
            timeout: DEFAULT_ROUTER_TIMEOUT,
            ignore_error: false,
            execute_after: Duration::ZERO,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_execute_after(mut self, delay: Duration) -> Self {
        self.execute_after = delay;
        self
    }

    pub fn ignoring_errors(mut self) -> Self {
        self.ignore_error = true;
        self
    }

    /// Wait out the start delay, then derive the scope the backend runs under.
    ///
    /// Fails with the scope's error if it is done before the delay elapses;
    /// the backend must not be invoked in that case.
    pub(crate) async fn start(&self, ctx: &RoutingContext) -> Result<RoutingContext, RoutingError> {
        if self.execute_after.is_zero() {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            return Ok(ctx.with_timeout(self.timeout));
        }
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            _ = tokio::time::sleep(self.execute_after) => Ok(ctx.with_timeout(self.timeout)),
        }
    }

    /// Whether a failure of this entry should reach the caller
    pub(crate) fn reports(&self, err: &RoutingError) -> bool {
        !self.ignore_error && !err.is_not_found()
    }
}

impl fmt::Debug for ParallelRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelRouter")
            .field("timeout", &self.timeout)
            .field("ignore_error", &self.ignore_error)
            .field("execute_after", &self.execute_after)
            .finish_non_exhaustive()
    }
}

/// Entry of a sequential composition
#[derive(Clone)]
pub struct SequentialRouter {
    pub router: Arc<dyn ContentRouting>,
    pub timeout: Duration,
    pub ignore_error: bool,
}

impl SequentialRouter {
    pub fn new(router: Arc<dyn ContentRouting>) -> Self {
        Self {
            router,
            timeout: DEFAULT_ROUTER_TIMEOUT,
            ignore_error: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ignoring_errors(mut self) -> Self {
        self.ignore_error = true;
        self
    }

    pub(crate) fn reports(&self, err: &RoutingError) -> bool {
        !self.ignore_error && !err.is_not_found()
    }
}

impl fmt::Debug for SequentialRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialRouter")
            .field("timeout", &self.timeout)
            .field("ignore_error", &self.ignore_error)
            .finish_non_exhaustive()
    }
}

/// Drive a backend future until it completes or `ctx` is done.
///
/// Stopping here only drops our interest in the result. Work the backend has
/// already committed elsewhere is not undone.
pub(crate) async fn run_until_done<T, Fut>(ctx: &RoutingContext, fut: Fut) -> Result<T, RoutingError>
where
    Fut: Future<Output = Result<T, RoutingError>>,
{
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::NullRouter;

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_for_delay_then_applies_timeout() {
        let entry = ParallelRouter::new(Arc::new(NullRouter))
            .with_execute_after(Duration::from_millis(100))
            .with_timeout(Duration::from_millis(30));

        let begin = tokio::time::Instant::now();
        let scope = entry.start(&RoutingContext::new()).await.unwrap();

        assert!(begin.elapsed() >= Duration::from_millis(100));
        assert_eq!(scope.deadline(), Some(begin + Duration::from_millis(130)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_abandoned_when_scope_expires_first() {
        let entry = ParallelRouter::new(Arc::new(NullRouter))
            .with_execute_after(Duration::from_secs(1));
        let ctx = RoutingContext::new().with_timeout(Duration::from_millis(10));

        assert_eq!(entry.start(&ctx).await.unwrap_err(), RoutingError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_start_refuses_cancelled_scope_without_delay() {
        let entry = ParallelRouter::new(Arc::new(NullRouter));
        let ctx = RoutingContext::new();
        ctx.cancel();

        assert_eq!(entry.start(&ctx).await.unwrap_err(), RoutingError::Cancelled);
    }

    #[test]
    fn test_reports_skips_soft_misses_and_ignored_entries() {
        let strict = ParallelRouter::new(Arc::new(NullRouter));
        let lenient = strict.clone().ignoring_errors();

        assert!(strict.reports(&RoutingError::backend("boom")));
        assert!(!strict.reports(&RoutingError::NotFound));
        assert!(!lenient.reports(&RoutingError::backend("boom")));
    }
}
