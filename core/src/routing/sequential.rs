//! Sequential composition: entries are tried strictly in order
//!
//! Each entry runs under its own timeout. Writes walk every entry and stop at
//! the first reported failure; lookups stop at the first usable answer.

use super::contract::{AddrInfo, ContentRouting, ProviderStream, ValueOptions, ValueStream};
use super::entry::{run_until_done, SequentialRouter};
use super::fan_in::{deliver, next_or_done, FanIn};
use crate::context::RoutingContext;
use crate::error::RoutingError;
use async_trait::async_trait;
use futures::stream::StreamExt;
use libp2p::kad::RecordKey;
use libp2p::PeerId;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Router that tries its entries one after another
#[derive(Debug, Clone, Default)]
pub struct ComposableSequential {
    routers: Vec<SequentialRouter>,
}

impl ComposableSequential {
    pub fn new(routers: Vec<SequentialRouter>) -> Self {
        Self { routers }
    }
}

async fn execute_sequential<F, Fut>(ctx: &RoutingContext, routers: &[SequentialRouter], op: F) -> Result<(), RoutingError>
where
    F: Fn(RoutingContext, Arc<dyn ContentRouting>) -> Fut,
    Fut: Future<Output = Result<(), RoutingError>>,
{
    for (index, entry) in routers.iter().enumerate() {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let entry_ctx = ctx.with_timeout(entry.timeout);
        match run_until_done(&entry_ctx, op(entry_ctx.clone(), entry.router.clone())).await {
            Ok(()) => {}
            Err(err) if entry.reports(&err) => return Err(err),
            Err(err) => debug!(entry = index, error = %err, "skipping router failure"),
        }
    }
    // An ignored last entry must not hide the caller's scope ending.
    match ctx.err() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn get_value_or_error_sequential<T, F, Fut>(
    ctx: &RoutingContext,
    routers: &[SequentialRouter],
    op: F,
    is_empty: impl Fn(&T) -> bool,
) -> Result<T, RoutingError>
where
    F: Fn(RoutingContext, Arc<dyn ContentRouting>) -> Fut,
    Fut: Future<Output = Result<T, RoutingError>>,
{
    for (index, entry) in routers.iter().enumerate() {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let entry_ctx = ctx.with_timeout(entry.timeout);
        match run_until_done(&entry_ctx, op(entry_ctx.clone(), entry.router.clone())).await {
            Ok(value) if !is_empty(&value) => return Ok(value),
            Ok(_) => debug!(entry = index, "router returned an empty value"),
            Err(err) if entry.reports(&err) => return Err(err),
            Err(err) => debug!(entry = index, error = %err, "router missed"),
        }
    }
    Err(ctx.err().unwrap_or(RoutingError::NotFound))
}

#[async_trait]
impl ContentRouting for ComposableSequential {
    async fn provide(&self, ctx: &RoutingContext, key: &RecordKey, announce: bool) -> Result<(), RoutingError> {
        execute_sequential(ctx, &self.routers, |ctx, router| async move {
            router.provide(&ctx, key, announce).await
        })
        .await
    }

    /// Drain each entry's providers in turn until `count` (if non-zero) is reached
    fn find_providers_async(&self, ctx: &RoutingContext, key: &RecordKey, count: usize) -> ProviderStream {
        let scope = ctx.child();
        let (tx, rx) = mpsc::channel::<AddrInfo>(1);
        let routers = self.routers.clone();
        let key = key.clone();
        let task_scope = scope.clone();
        tokio::spawn(async move {
            let mut delivered = 0usize;
            for entry in routers {
                let remaining = if count == 0 { 0 } else { count - delivered };
                let entry_ctx = task_scope.with_timeout(entry.timeout);
                let mut providers = entry.router.find_providers_async(&entry_ctx, &key, remaining);
                while let Some(info) = next_or_done(&entry_ctx, &mut providers).await {
                    if !deliver(&entry_ctx, &tx, info).await {
                        break;
                    }
                    delivered += 1;
                    if count != 0 && delivered >= count {
                        return;
                    }
                }
                if task_scope.is_done() {
                    return;
                }
            }
        });
        FanIn::new(rx, scope, |_| false).boxed()
    }

    async fn find_peer(&self, ctx: &RoutingContext, peer: &PeerId) -> Result<AddrInfo, RoutingError> {
        get_value_or_error_sequential(
            ctx,
            &self.routers,
            |ctx, router| async move { router.find_peer(&ctx, peer).await },
            AddrInfo::is_empty,
        )
        .await
    }

    async fn put_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        value: &[u8],
        opts: &ValueOptions,
    ) -> Result<(), RoutingError> {
        execute_sequential(ctx, &self.routers, |ctx, router| async move {
            router.put_value(&ctx, key, value, opts).await
        })
        .await
    }

    async fn get_value(&self, ctx: &RoutingContext, key: &str, opts: &ValueOptions) -> Result<Vec<u8>, RoutingError> {
        get_value_or_error_sequential(
            ctx,
            &self.routers,
            |ctx, router| async move { router.get_value(&ctx, key, opts).await },
            |value: &Vec<u8>| value.is_empty(),
        )
        .await
    }

    /// Values from each entry in turn; a reported failure ends the stream
    async fn search_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        opts: &ValueOptions,
    ) -> Result<ValueStream, RoutingError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if self.routers.is_empty() {
            return Err(RoutingError::NotFound);
        }

        let scope = ctx.child();
        let (tx, rx) = mpsc::channel::<Result<Vec<u8>, RoutingError>>(1);
        let routers = self.routers.clone();
        let key = key.to_owned();
        let opts = opts.clone();
        let task_scope = scope.clone();
        tokio::spawn(async move {
            for (index, entry) in routers.into_iter().enumerate() {
                let entry_ctx = task_scope.with_timeout(entry.timeout);
                let opened = run_until_done(&entry_ctx, entry.router.search_value(&entry_ctx, &key, &opts)).await;
                let mut values = match opened {
                    Ok(values) => values,
                    Err(err) if entry.reports(&err) => {
                        deliver(&task_scope, &tx, Err(err)).await;
                        return;
                    }
                    Err(err) => {
                        debug!(entry = index, error = %err, "search skipped");
                        continue;
                    }
                };
                while let Some(item) = next_or_done(&entry_ctx, &mut values).await {
                    match item {
                        Ok(value) => {
                            if !deliver(&entry_ctx, &tx, Ok(value)).await {
                                break;
                            }
                        }
                        Err(err) if entry.reports(&err) => {
                            deliver(&task_scope, &tx, Err(err)).await;
                            return;
                        }
                        Err(err) => {
                            debug!(entry = index, error = %err, "search ended early");
                            break;
                        }
                    }
                }
                if task_scope.is_done() {
                    return;
                }
            }
        });

        Ok(FanIn::new(rx, scope, |item: &Result<Vec<u8>, RoutingError>| item.is_err()).boxed())
    }

    async fn bootstrap(&self, ctx: &RoutingContext) -> Result<(), RoutingError> {
        execute_sequential(ctx, &self.routers, |ctx, router| async move { router.bootstrap(&ctx).await }).await
    }
}
