//! Content routing facade: one logical call, many backends
//!
//! Composites fan each call out over a set of independently operated routing
//! backends and reduce their answers into one:
//! - Contract: the operation set every backend (and every composite) exposes
//! - Entry: a backend paired with its start delay, timeout and error policy
//! - Parallel: all entries at once; writes require all, lookups race, streams merge
//! - Sequential: entries strictly in order, stopping at the first answer
//! - Null: a backend that answers without doing anything

pub mod contract;
pub mod entry;
mod fan_in;
pub mod null;
pub mod parallel;
pub mod sequential;

mod reduce;

pub use contract::{AddrInfo, ContentRouting, ProvideMany, ProviderStream, ValueOptions, ValueStream};
pub use entry::{ParallelRouter, SequentialRouter, DEFAULT_ROUTER_TIMEOUT};
pub use null::NullRouter;
pub use parallel::ComposableParallel;
pub use sequential::ComposableSequential;
