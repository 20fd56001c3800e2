// Declarative router composition
//
// A config names composites and the entries they drive. Entry names resolve
// either to another composite in the same config (so compositions nest) or
// to a concrete backend supplied by the caller. Example:
//
// {
//   "root": "main",
//   "routers": {
//     "main": {
//       "type": "parallel",
//       "routers": [
//         { "router": "dht", "timeout_ms": 300000 },
//         { "router": "http", "ignore_errors": true, "execute_after_ms": 500 }
//       ]
//     }
//   }
// }

use crate::routing::{
    ComposableParallel, ComposableSequential, ContentRouting, ParallelRouter, SequentialRouter,
    DEFAULT_ROUTER_TIMEOUT,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown router: {0}")]
    UnknownRouter(String),
    #[error("Router cycle: {0}")]
    Cycle(String),
    #[error("Sequential router {0} cannot delay its entries (execute_after_ms must be 0)")]
    DelayedSequentialEntry(String),
}

/// Top-level composition config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Name of the router handed back by [`RoutingConfig::build`]
    pub root: String,

    /// Composite routers by name
    #[serde(default)]
    pub routers: BTreeMap<String, RouterSpec>,
}

/// One composite router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RouterSpec {
    Parallel { routers: Vec<EntrySpec> },
    Sequential { routers: Vec<EntrySpec> },
}

/// One entry of a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    /// Composite or backend name
    pub router: String,

    #[serde(default)]
    pub ignore_errors: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub execute_after_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_ROUTER_TIMEOUT.as_millis() as u64
}

impl EntrySpec {
    fn parallel(&self, router: Arc<dyn ContentRouting>) -> ParallelRouter {
        let entry = ParallelRouter::new(router)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_execute_after(Duration::from_millis(self.execute_after_ms));
        if self.ignore_errors {
            entry.ignoring_errors()
        } else {
            entry
        }
    }

    fn sequential(&self, router: Arc<dyn ContentRouting>) -> SequentialRouter {
        let entry = SequentialRouter::new(router).with_timeout(Duration::from_millis(self.timeout_ms));
        if self.ignore_errors {
            entry.ignoring_errors()
        } else {
            entry
        }
    }
}

impl RoutingConfig {
    /// Load config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read routing config {}", path.display()))?;
        Self::from_json(&contents)
    }

    /// Parse config from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse routing config")
    }

    /// Build the root router, resolving entry names against `backends`
    pub fn build(
        &self,
        backends: &HashMap<String, Arc<dyn ContentRouting>>,
    ) -> Result<Arc<dyn ContentRouting>, ConfigError> {
        let mut built = HashMap::new();
        let mut visiting = Vec::new();
        let root = self.resolve(&self.root, backends, &mut built, &mut visiting)?;
        info!("Routing composition built: root={} composites={}", self.root, built.len());
        Ok(root)
    }

    fn resolve(
        &self,
        name: &str,
        backends: &HashMap<String, Arc<dyn ContentRouting>>,
        built: &mut HashMap<String, Arc<dyn ContentRouting>>,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<dyn ContentRouting>, ConfigError> {
        if let Some(router) = built.get(name) {
            return Ok(router.clone());
        }
        // Composites shadow backends with the same name.
        let Some(composite) = self.routers.get(name) else {
            return backends
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownRouter(name.to_string()));
        };
        if visiting.iter().any(|seen| seen == name) {
            visiting.push(name.to_string());
            return Err(ConfigError::Cycle(visiting.join(" -> ")));
        }

        visiting.push(name.to_string());
        let router: Arc<dyn ContentRouting> = match composite {
            RouterSpec::Parallel { routers } => {
                let mut entries = Vec::with_capacity(routers.len());
                for entry in routers {
                    let backend = self.resolve(&entry.router, backends, built, visiting)?;
                    entries.push(entry.parallel(backend));
                }
                Arc::new(ComposableParallel::new(entries))
            }
            RouterSpec::Sequential { routers } => {
                let mut entries = Vec::with_capacity(routers.len());
                for entry in routers {
                    if entry.execute_after_ms != 0 {
                        return Err(ConfigError::DelayedSequentialEntry(name.to_string()));
                    }
                    let backend = self.resolve(&entry.router, backends, built, visiting)?;
                    entries.push(entry.sequential(backend));
                }
                Arc::new(ComposableSequential::new(entries))
            }
        };
        visiting.pop();

        debug!("Composite router built: {}", name);
        built.insert(name.to_string(), router.clone());
        Ok(router)
    }
}
