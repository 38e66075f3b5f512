//! Configuration for the fetcher.

use crate::error::ConfigError;
use crate::proxy::ProxyEndpoint;

use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept-language", "es-AR,es;q=0.9"),
    ("connection", "keep-alive"),
];

/// Configuration for a [`Fetcher`](crate::Fetcher). Fixed once built.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Headers sent with every request, under the random User-Agent and the
    /// caller's own headers.
    pub default_headers: HeaderMap,
    /// Proxies to rotate through when `use_proxy` is set.
    pub proxies: Vec<ProxyEndpoint>,
    /// Enables proxy rotation and eviction.
    pub use_proxy: bool,
    /// Maximum number of attempts per request.
    pub max_retries: u32,
    /// Base delay in seconds; iteration `k` waits `backoff_factor * 2^k`.
    pub backoff_factor: f64,
    /// Deadline for a single transport attempt.
    pub timeout: Duration,
    /// Allows the browser transport to retry blocked (403/429/503) attempts.
    pub enable_fallback_transport: bool,
}

impl FetcherConfig {
    /// Create a new configuration builder.
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::new()
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            default_headers: DEFAULT_HEADERS
                .iter()
                .map(|&(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
                .collect(),
            proxies: Vec::new(),
            use_proxy: false,
            max_retries: 5,
            backoff_factor: 1.0,
            timeout: Duration::from_secs(10),
            enable_fallback_transport: true,
        }
    }
}

/// Builder for `FetcherConfig`.
#[derive(Debug, Default)]
pub struct FetcherConfigBuilder {
    headers: Option<Vec<(String, String)>>,
    proxies: Vec<ProxyEndpoint>,
    use_proxy: Option<bool>,
    max_retries: Option<u32>,
    backoff_factor: Option<f64>,
    timeout: Option<Duration>,
    enable_fallback_transport: Option<bool>,
}

impl FetcherConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default header. Supplying any header replaces the built-in
    /// defaults entirely.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    /// Set the proxy list.
    pub fn proxies<P: Into<ProxyEndpoint>>(mut self, proxies: impl IntoIterator<Item = P>) -> Self {
        self.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single proxy.
    pub fn proxy(mut self, proxy: impl Into<ProxyEndpoint>) -> Self {
        self.proxies.push(proxy.into());
        self
    }

    /// Enable or disable proxy rotation.
    pub fn use_proxy(mut self, enabled: bool) -> Self {
        self.use_proxy = Some(enabled);
        self
    }

    /// Set the maximum number of attempts per request.
    pub fn max_retries(mut self, count: u32) -> Self {
        self.max_retries = Some(count);
        self
    }

    /// Set the base backoff delay in seconds.
    pub fn backoff_factor(mut self, seconds: f64) -> Self {
        self.backoff_factor = Some(seconds);
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable the browser fallback transport.
    pub fn enable_fallback_transport(mut self, enabled: bool) -> Self {
        self.enable_fallback_transport = Some(enabled);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<FetcherConfig, ConfigError> {
        let defaults = FetcherConfig::default();

        let max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        if max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        let backoff_factor = self.backoff_factor.unwrap_or(defaults.backoff_factor);
        if !backoff_factor.is_finite() || backoff_factor < 0.0 {
            return Err(ConfigError::InvalidBackoff(backoff_factor));
        }

        let timeout = self.timeout.unwrap_or(defaults.timeout);
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        let default_headers = match self.headers {
            Some(pairs) => {
                let mut headers = HeaderMap::new();
                for (name, value) in pairs {
                    let header_name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
                    let header_value =
                        HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidHeader(name))?;
                    headers.insert(header_name, header_value);
                }
                headers
            }
            None => defaults.default_headers,
        };

        Ok(FetcherConfig {
            default_headers,
            proxies: self.proxies,
            use_proxy: self.use_proxy.unwrap_or(defaults.use_proxy),
            max_retries,
            backoff_factor,
            timeout,
            enable_fallback_transport: self
                .enable_fallback_transport
                .unwrap_or(defaults.enable_fallback_transport),
        })
    }
}
