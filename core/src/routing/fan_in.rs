//! Streaming fan-in for multi-result operations
//!
//! Each entry task forwards its own result stream into a shared, rendezvous
//! sized channel. The caller reads the merged side through [`FanIn`], which
//! owns the call scope: dropping it cancels every entry task, and once the
//! scope is done no further item is yielded.

use super::contract::{AddrInfo, ProviderStream, ValueOptions, ValueStream};
use super::entry::{run_until_done, ParallelRouter};
use crate::context::RoutingContext;
use crate::error::RoutingError;
use futures::stream::{Stream, StreamExt};
use libp2p::kad::RecordKey;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::{debug, trace, warn};

/// Merged output of concurrently running entry streams
pub(crate) struct FanIn<T> {
    rx: mpsc::Receiver<T>,
    scope: RoutingContext,
    _guard: DropGuard,
    terminal: fn(&T) -> bool,
    finished: bool,
}

impl<T> FanIn<T> {
    /// `terminal` marks items after which the merged stream ends
    pub(crate) fn new(rx: mpsc::Receiver<T>, scope: RoutingContext, terminal: fn(&T) -> bool) -> Self {
        let _guard = scope.drop_guard();
        Self {
            rx,
            scope,
            _guard,
            terminal,
            finished: false,
        }
    }
}

impl<T> Unpin for FanIn<T> {}

impl<T> Stream for FanIn<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.scope.is_done() {
            this.finished = true;
            this.rx.close();
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if (this.terminal)(&item) {
                    this.finished = true;
                    this.scope.cancel();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Next item of `stream`, or `None` once `ctx` is done
pub(crate) async fn next_or_done<S>(ctx: &RoutingContext, stream: &mut S) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        _ = ctx.done() => None,
        item = stream.next() => item,
    }
}

/// Hand `item` to the consumer; `false` when the entry should stop
pub(crate) async fn deliver<T>(ctx: &RoutingContext, tx: &mpsc::Sender<T>, item: T) -> bool {
    tokio::select! {
        biased;
        _ = ctx.done() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Merge provider lookups from every entry.
///
/// `count > 0` caps the total across all entries. The cap is a shared
/// counter bumped before each delivery, so concurrently racing entries may
/// overshoot it slightly.
pub(crate) fn find_providers(
    ctx: &RoutingContext,
    routers: &[ParallelRouter],
    key: &RecordKey,
    count: usize,
) -> ProviderStream {
    let scope = ctx.child();
    let (tx, rx) = mpsc::channel::<AddrInfo>(1);
    let delivered = Arc::new(AtomicUsize::new(0));

    for (index, entry) in routers.iter().cloned().enumerate() {
        let scope = scope.clone();
        let tx = tx.clone();
        let key = key.clone();
        let delivered = delivered.clone();
        tokio::spawn(async move {
            let Ok(entry_ctx) = entry.start(&scope).await else {
                return;
            };
            let mut providers = entry.router.find_providers_async(&entry_ctx, &key, count);
            while let Some(info) = next_or_done(&entry_ctx, &mut providers).await {
                if count != 0 && delivered.fetch_add(1, Ordering::Relaxed) >= count {
                    trace!(entry = index, count, "provider quota reached");
                    return;
                }
                if !deliver(&entry_ctx, &tx, info).await {
                    return;
                }
            }
            debug!(entry = index, "provider stream drained");
        });
    }

    FanIn::new(rx, scope, |_| false).boxed()
}

/// Merge value searches from every entry.
///
/// The merged stream is handed back immediately. A reported failure from any
/// entry (opening its search or mid-stream) is yielded as the final item,
/// after which the stream ends and the other entries are cancelled. Soft
/// misses and ignored failures only shorten the result set.
pub(crate) fn search_value(
    ctx: &RoutingContext,
    routers: &[ParallelRouter],
    key: &str,
    opts: &ValueOptions,
) -> Result<ValueStream, RoutingError> {
    if let Some(err) = ctx.err() {
        return Err(err);
    }
    if routers.is_empty() {
        return Err(RoutingError::NotFound);
    }

    let scope = ctx.child();
    let (tx, rx) = mpsc::channel::<Result<Vec<u8>, RoutingError>>(1);

    for (index, entry) in routers.iter().cloned().enumerate() {
        let scope = scope.clone();
        let tx = tx.clone();
        let key = key.to_owned();
        let opts = opts.clone();
        tokio::spawn(async move {
            let Ok(entry_ctx) = entry.start(&scope).await else {
                return;
            };
            let opened = run_until_done(&entry_ctx, entry.router.search_value(&entry_ctx, &key, &opts)).await;
            let mut values = match opened {
                Ok(values) => values,
                Err(err) if entry.reports(&err) => {
                    warn!(entry = index, error = %err, "search failed to start");
                    deliver(&entry_ctx, &tx, Err(err)).await;
                    return;
                }
                Err(err) => {
                    debug!(entry = index, error = %err, "search skipped");
                    return;
                }
            };

            while let Some(item) = next_or_done(&entry_ctx, &mut values).await {
                match item {
                    Ok(value) => {
                        if !deliver(&entry_ctx, &tx, Ok(value)).await {
                            return;
                        }
                    }
                    Err(err) if entry.reports(&err) => {
                        warn!(entry = index, error = %err, "search failed mid-stream");
                        deliver(&entry_ctx, &tx, Err(err)).await;
                        return;
                    }
                    Err(err) => {
                        debug!(entry = index, error = %err, "search ended early");
                        return;
                    }
                }
            }
        });
    }

    Ok(FanIn::new(rx, scope, |item: &Result<Vec<u8>, RoutingError>| item.is_err()).boxed())
}
