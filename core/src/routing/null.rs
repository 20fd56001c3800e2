//! Null backend: answers every call without doing anything

use super::contract::{AddrInfo, ContentRouting, ProviderStream, ValueOptions, ValueStream};
use crate::context::RoutingContext;
use crate::error::RoutingError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use libp2p::kad::RecordKey;
use libp2p::PeerId;

/// Backend that knows nothing and stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRouter;

#[async_trait]
impl ContentRouting for NullRouter {
    async fn provide(&self, _ctx: &RoutingContext, _key: &RecordKey, _announce: bool) -> Result<(), RoutingError> {
        Ok(())
    }

    fn find_providers_async(&self, _ctx: &RoutingContext, _key: &RecordKey, _count: usize) -> ProviderStream {
        stream::empty().boxed()
    }

    async fn find_peer(&self, _ctx: &RoutingContext, _peer: &PeerId) -> Result<AddrInfo, RoutingError> {
        Err(RoutingError::NotFound)
    }

    async fn put_value(
        &self,
        _ctx: &RoutingContext,
        _key: &str,
        _value: &[u8],
        _opts: &ValueOptions,
    ) -> Result<(), RoutingError> {
        Err(RoutingError::NotSupported)
    }

    async fn get_value(&self, _ctx: &RoutingContext, _key: &str, _opts: &ValueOptions) -> Result<Vec<u8>, RoutingError> {
        Err(RoutingError::NotFound)
    }

    async fn search_value(
        &self,
        _ctx: &RoutingContext,
        _key: &str,
        _opts: &ValueOptions,
    ) -> Result<ValueStream, RoutingError> {
        Ok(stream::empty().boxed())
    }

    async fn bootstrap(&self, _ctx: &RoutingContext) -> Result<(), RoutingError> {
        Ok(())
    }
}
