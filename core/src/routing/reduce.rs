//! Fan-out reducers shared by every parallel operation
//!
//! Both reducers spawn one task per entry. Each task waits out its entry's
//! start delay, runs the operation under the entry deadline and reports back
//! over a channel. The reducers differ only in how they fold those reports:
//!
//! - [`execute`] waits for every task and aggregates every reported failure.
//! - [`get_value_or_error`] returns the first usable value (or hard failure)
//!   and cancels the remaining tasks.

use super::contract::ContentRouting;
use super::entry::{run_until_done, ParallelRouter};
use crate::context::RoutingContext;
use crate::error::{MultiError, RoutingError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Run `op` against every entry and succeed only if no reporting entry failed.
///
/// Never short-circuits: all entries run to completion (or to their deadline)
/// before the aggregate is returned. Backends that succeeded stay succeeded
/// even when the aggregate reports a failure.
pub(crate) async fn execute<F, Fut>(
    ctx: &RoutingContext,
    routers: &[ParallelRouter],
    op: F,
) -> Result<(), RoutingError>
where
    F: Fn(RoutingContext, Arc<dyn ContentRouting>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<(), RoutingError>> + Send + 'static,
{
    // Cancels the entry tasks if the caller stops waiting on us.
    let scope = ctx.child();
    let _guard = scope.drop_guard();

    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    for (index, entry) in routers.iter().cloned().enumerate() {
        let scope = scope.clone();
        let err_tx = err_tx.clone();
        let op = op.clone();
        tokio::spawn(async move {
            let entry_ctx = match entry.start(&scope).await {
                Ok(entry_ctx) => entry_ctx,
                Err(err) => {
                    debug!(entry = index, error = %err, "router abandoned before start");
                    if !entry.ignore_error {
                        let _ = err_tx.send(err);
                    }
                    return;
                }
            };

            let result = run_until_done(&entry_ctx, op(entry_ctx.clone(), entry.router.clone())).await;
            match result {
                Ok(()) => debug!(entry = index, "router succeeded"),
                Err(err) if entry.ignore_error => {
                    debug!(entry = index, error = %err, "ignoring router failure");
                }
                Err(err) => {
                    warn!(entry = index, error = %err, "router failed");
                    let _ = err_tx.send(err);
                }
            }
        });
    }
    drop(err_tx);

    let mut errors = MultiError::new();
    while let Some(err) = err_rx.recv().await {
        errors.push(err);
    }

    // The caller's own cancellation or deadline is reported even when every
    // entry ignores its errors.
    if let Some(err) = ctx.err() {
        let recorded = errors.iter().filter(|seen| seen.is_context_error()).any(|seen| *seen == err);
        if !recorded {
            debug!(error = %err, "caller scope ended during require-all call");
            errors.push(err);
        }
    }
    errors.into_result()
}

/// Race `op` across every entry and return the first non-empty value.
///
/// Soft misses (`NotFound`, or a value `is_empty` rejects) and ignored
/// failures drop out of the race silently. A reported failure ends the race
/// just like a winning value does. Once the race is decided every other
/// entry is cancelled. If no entry produces anything the result is `NotFound`.
///
/// An entry that overruns its own timeout also drops out silently: its
/// `DeadlineExceeded` is never delivered, so it cannot end the race. Only the
/// caller's scope ending surfaces as a context error.
pub(crate) async fn get_value_or_error<T, F, Fut, E>(
    ctx: &RoutingContext,
    routers: &[ParallelRouter],
    op: F,
    is_empty: E,
) -> Result<T, RoutingError>
where
    T: Send + 'static,
    F: Fn(RoutingContext, Arc<dyn ContentRouting>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T, RoutingError>> + Send + 'static,
    E: Fn(&T) -> bool + Clone + Send + 'static,
{
    let race = ctx.child();
    let _guard = race.drop_guard();

    let (tx, mut rx) = mpsc::unbounded_channel::<Result<T, RoutingError>>();
    for (index, entry) in routers.iter().cloned().enumerate() {
        let race = race.clone();
        let tx = tx.clone();
        let op = op.clone();
        let is_empty = is_empty.clone();
        tokio::spawn(async move {
            let entry_ctx = match entry.start(&race).await {
                Ok(entry_ctx) => entry_ctx,
                Err(err) => {
                    if !entry.ignore_error {
                        let _ = tx.send(Err(err));
                    }
                    return;
                }
            };

            let outcome = match run_until_done(&entry_ctx, op(entry_ctx.clone(), entry.router.clone())).await {
                Ok(value) if is_empty(&value) => {
                    debug!(entry = index, "router returned an empty value");
                    return;
                }
                Ok(value) => Ok(value),
                Err(err) if entry.reports(&err) => Err(err),
                Err(err) => {
                    debug!(entry = index, error = %err, "router dropped out of race");
                    return;
                }
            };

            // An entry whose scope is already done (race decided, caller gone
            // or its own deadline hit) never delivers.
            if entry_ctx.is_done() {
                return;
            }
            if let Err(err) = &outcome {
                warn!(entry = index, error = %err, "router failed, ending race");
            }
            let _ = tx.send(outcome);
        });
    }
    drop(tx);

    let outcome = tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        received = rx.recv() => received.unwrap_or(Err(RoutingError::NotFound)),
    };
    race.cancel();
    outcome
}
