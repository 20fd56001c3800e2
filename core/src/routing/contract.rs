//! Backend capability contract
//!
//! Every routing backend (DHT client, HTTP delegate, registry, or another
//! composite) exposes the same operation set. Composites implement this trait
//! themselves, so they nest freely.

use crate::context::RoutingContext;
use crate::error::RoutingError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use libp2p::kad::RecordKey;
use libp2p::{Multiaddr, PeerId};

/// Stream of provider records for a content key
pub type ProviderStream = BoxStream<'static, AddrInfo>;

/// Stream of candidate values for a record key
pub type ValueStream = BoxStream<'static, Result<Vec<u8>, RoutingError>>;

/// A peer together with the addresses it can be reached on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// An answer with no addresses carries nothing a caller can dial
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Options forwarded untouched to backends on record reads and writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueOptions {
    /// Accept records whose validity has lapsed
    pub expired: bool,
    /// Answer from local state only, without touching the network
    pub offline: bool,
    /// Number of matching responses a backend should wait for, if it supports quorums
    pub quorum: Option<usize>,
}

/// Operations every routing backend exposes
#[async_trait]
pub trait ContentRouting: Send + Sync {
    /// Announce (or, with `announce = false`, only record locally) that we provide `key`
    async fn provide(
        &self,
        ctx: &RoutingContext,
        key: &RecordKey,
        announce: bool,
    ) -> Result<(), RoutingError>;

    /// Stream providers of `key`; `count == 0` means unbounded
    fn find_providers_async(
        &self,
        ctx: &RoutingContext,
        key: &RecordKey,
        count: usize,
    ) -> ProviderStream;

    /// Resolve the addresses of `peer`; `NotFound` when the peer is unknown
    async fn find_peer(&self, ctx: &RoutingContext, peer: &PeerId)
        -> Result<AddrInfo, RoutingError>;

    /// Store a record
    async fn put_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        value: &[u8],
        opts: &ValueOptions,
    ) -> Result<(), RoutingError>;

    /// Fetch a record; `NotFound` when absent
    async fn get_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        opts: &ValueOptions,
    ) -> Result<Vec<u8>, RoutingError>;

    /// Stream successively better values for a record
    async fn search_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        opts: &ValueOptions,
    ) -> Result<ValueStream, RoutingError>;

    /// Bring the backend into a usable state
    async fn bootstrap(&self, ctx: &RoutingContext) -> Result<(), RoutingError>;

    /// Batch-publish capability, when the backend has one
    fn as_provide_many(&self) -> Option<&dyn ProvideMany> {
        None
    }
}

/// Optional batch-publish extension
#[async_trait]
pub trait ProvideMany: Send + Sync {
    /// Announce every key in one pass
    async fn provide_many(&self, ctx: &RoutingContext, keys: &[RecordKey])
        -> Result<(), RoutingError>;

    /// Whether the backend can accept a batch right now
    fn ready(&self) -> bool;
}
