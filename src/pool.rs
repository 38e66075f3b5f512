//! Proxy pool: the configured endpoint list and its per-call working copies.

use crate::proxy::ProxyEndpoint;
use crate::random::Chooser;
use crate::utils;

use log::{info, warn};
use std::sync::Arc;

/// The configured proxy list, fixed at construction and shared read-only.
///
/// Every top-level request takes its own [`WorkingPool`] snapshot, so
/// evictions made by one request never affect another.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    configured: Arc<[ProxyEndpoint]>,
}

impl ProxyPool {
    pub fn new<I, P>(proxies: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProxyEndpoint>,
    {
        Self {
            configured: proxies.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a pool from proxy lists at the given URLs or file paths.
    /// Sources that fail to load are skipped with a warning.
    pub async fn from_sources(sources: &[impl AsRef<str>]) -> Self {
        info!("Loading proxy list from {} sources", sources.len());

        let mut proxies: Vec<ProxyEndpoint> = Vec::new();
        for source in sources {
            let source = source.as_ref();
            match utils::fetch_source(source).await {
                Ok(content) => {
                    let parsed = utils::parse_proxy_list(&content);
                    info!("Loaded {} proxies from {}", parsed.len(), source);
                    for entry in parsed {
                        let endpoint = ProxyEndpoint::new(entry);
                        if !proxies.contains(&endpoint) {
                            proxies.push(endpoint);
                        }
                    }
                }
                Err(e) => warn!("Failed to load proxies from {}: {}", source, e),
            }
        }

        info!("Proxy pool holds {} unique proxies", proxies.len());
        Self::new(proxies)
    }

    /// A fresh mutable copy of the configured list for one request.
    pub fn snapshot(&self) -> WorkingPool {
        WorkingPool {
            proxies: self.configured.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.configured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }

    pub fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.configured
    }
}

/// Call-local set of proxies still eligible for the current request.
///
/// Only ever shrinks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingPool {
    proxies: Vec<ProxyEndpoint>,
}

impl WorkingPool {
    /// An empty pool, used when proxy usage is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pick one remaining proxy uniformly at random.
    pub fn choose(&self, chooser: &dyn Chooser) -> Option<&ProxyEndpoint> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = chooser.index(self.proxies.len()).min(self.proxies.len() - 1);
        self.proxies.get(idx)
    }

    /// Remove every occurrence of `endpoint`. Returns how many were removed.
    pub fn evict(&mut self, endpoint: &ProxyEndpoint) -> usize {
        let before = self.proxies.len();
        self.proxies.retain(|p| p != endpoint);
        before - self.proxies.len()
    }

    pub fn contains(&self, endpoint: &ProxyEndpoint) -> bool {
        self.proxies.contains(endpoint)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
