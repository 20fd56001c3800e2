// Routemux Core: content routing facade
//
// "Ask every router once, answer the caller once."
//
// Backends (DHT clients, HTTP delegates, registries) are consumed only
// through the `ContentRouting` contract; this crate decides when each one
// runs, how long it may take and whether its failure matters.

pub mod config;
pub mod context;
pub mod error;
pub mod routing;

pub use config::{ConfigError, EntrySpec, RouterSpec, RoutingConfig};
pub use context::RoutingContext;
pub use error::{MultiError, RoutingError};
pub use routing::{
    AddrInfo, ComposableParallel, ComposableSequential, ContentRouting, NullRouter, ParallelRouter,
    ProvideMany, ProviderStream, SequentialRouter, ValueOptions, ValueStream,
};

// Re-exported so callers can name keys and peers without a direct libp2p dependency.
pub use libp2p::kad::RecordKey;
pub use libp2p::{Multiaddr, PeerId};

// ============================================================================
// LOGGING
// ============================================================================

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Safe to call more than once; later calls are no-ops.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}
