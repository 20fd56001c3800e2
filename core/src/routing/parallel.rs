//! Parallel composition: every entry runs concurrently
//!
//! Writes and bootstrap use the require-all reducer, point lookups race the
//! entries, and multi-result lookups are merged into one stream. Use an
//! entry's `execute_after` to give preferred backends a head start.

use super::contract::{AddrInfo, ContentRouting, ProvideMany, ProviderStream, ValueOptions, ValueStream};
use super::entry::ParallelRouter;
use super::fan_in;
use super::reduce::{execute, get_value_or_error};
use crate::context::RoutingContext;
use crate::error::RoutingError;
use async_trait::async_trait;
use libp2p::kad::RecordKey;
use libp2p::PeerId;

/// Router that drives all of its entries in parallel
#[derive(Debug, Clone, Default)]
pub struct ComposableParallel {
    routers: Vec<ParallelRouter>,
}

impl ComposableParallel {
    /// Compose `routers`. An entry with `ignore_error` never fails the call,
    /// though the caller's own cancellation or deadline still does. An entry's
    /// timeout starts counting after its `execute_after` delay.
    pub fn new(routers: Vec<ParallelRouter>) -> Self {
        Self { routers }
    }
}

#[async_trait]
impl ContentRouting for ComposableParallel {
    /// Provide through every entry; some may have succeeded even if this fails.
    async fn provide(&self, ctx: &RoutingContext, key: &RecordKey, announce: bool) -> Result<(), RoutingError> {
        let key = key.clone();
        execute(ctx, &self.routers, move |ctx, router| {
            let key = key.clone();
            async move { router.provide(&ctx, &key, announce).await }
        })
        .await
    }

    /// Providers from every entry, in no particular order. With `count > 0`
    /// roughly that many are returned, from whichever entries answer first.
    fn find_providers_async(&self, ctx: &RoutingContext, key: &RecordKey, count: usize) -> ProviderStream {
        fan_in::find_providers(ctx, &self.routers, key, count)
    }

    /// First entry to resolve the peer wins; the others are cancelled.
    async fn find_peer(&self, ctx: &RoutingContext, peer: &PeerId) -> Result<AddrInfo, RoutingError> {
        let peer = *peer;
        get_value_or_error(
            ctx,
            &self.routers,
            move |ctx, router| async move { router.find_peer(&ctx, &peer).await },
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
        let key = key.to_owned();
        let value = value.to_vec();
        let opts = opts.clone();
        execute(ctx, &self.routers, move |ctx, router| {
            let (key, value, opts) = (key.clone(), value.clone(), opts.clone());
            async move { router.put_value(&ctx, &key, &value, &opts).await }
        })
        .await
    }

    /// First non-empty record wins; the others are cancelled.
    async fn get_value(&self, ctx: &RoutingContext, key: &str, opts: &ValueOptions) -> Result<Vec<u8>, RoutingError> {
        let key = key.to_owned();
        let opts = opts.clone();
        get_value_or_error(
            ctx,
            &self.routers,
            move |ctx, router| {
                let (key, opts) = (key.clone(), opts.clone());
                async move { router.get_value(&ctx, &key, &opts).await }
            },
            |value: &Vec<u8>| value.is_empty(),
        )
        .await
    }

    async fn search_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        opts: &ValueOptions,
    ) -> Result<ValueStream, RoutingError> {
        fan_in::search_value(ctx, &self.routers, key, opts)
    }

    async fn bootstrap(&self, ctx: &RoutingContext) -> Result<(), RoutingError> {
        execute(ctx, &self.routers, |ctx, router| async move { router.bootstrap(&ctx).await }).await
    }

    fn as_provide_many(&self) -> Option<&dyn ProvideMany> {
        Some(self)
    }
}

#[async_trait]
impl ProvideMany for ComposableParallel {
    /// Batch-provide through every entry that supports it; others are skipped.
    async fn provide_many(&self, ctx: &RoutingContext, keys: &[RecordKey]) -> Result<(), RoutingError> {
        let keys = keys.to_vec();
        execute(ctx, &self.routers, move |ctx, router| {
            let keys = keys.clone();
            async move {
                match router.as_provide_many() {
                    Some(batch) => batch.provide_many(&ctx, &keys).await,
                    None => Ok(()),
                }
            }
        })
        .await
    }

    /// True when at least one entry can batch and all that can are ready
    fn ready(&self) -> bool {
        let mut capable = self
            .routers
            .iter()
            .filter_map(|entry| entry.router.as_provide_many())
            .peekable();
        capable.peek().is_some() && capable.all(|batch| batch.ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::NullRouter;
    use std::sync::Arc;

    #[test]
    fn test_not_ready_without_batch_capable_entries() {
        let router = ComposableParallel::new(vec![ParallelRouter::new(Arc::new(NullRouter))]);
        assert!(!router.ready());
    }

    #[tokio::test]
    async fn test_nested_composition_is_a_backend() {
        let inner: Arc<dyn ContentRouting> =
            Arc::new(ComposableParallel::new(vec![ParallelRouter::new(Arc::new(NullRouter))]));
        let outer = ComposableParallel::new(vec![ParallelRouter::new(inner)]);

        let ctx = RoutingContext::new();
        assert_eq!(outer.bootstrap(&ctx).await, Ok(()));
        assert_eq!(outer.find_peer(&ctx, &PeerId::random()).await, Err(RoutingError::NotFound));
    }
}
