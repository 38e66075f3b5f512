//! Retrying fetcher: proxy rotation, exponential backoff and browser fallback.

use crate::backoff::{self, Sleeper, TokioSleeper};
use crate::browser::BrowserTransport;
use crate::config::FetcherConfig;
use crate::error::{FetchError, TransportError};
use crate::pool::{ProxyPool, WorkingPool};
use crate::proxy::ProxyEndpoint;
use crate::random::{Chooser, ThreadRandom};
use crate::request::{RequestBody, RequestSpec, Response};
use crate::transport::{Attempt, AttemptResult, StandardTransport, Transport};
use crate::user_agent::{UserAgentList, UserAgentSource, FALLBACK_USER_AGENT};

use futures::stream::{self, StreamExt};
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue, StatusCode};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;

/// Statuses treated as anti-bot defenses rather than ordinary errors.
pub fn is_blocked(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Per-call loop state. Created fresh for every top-level request and never
/// shared between calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// Iterations used so far.
    pub retries: u32,
    /// Proxies not yet evicted in this call.
    pub pool: WorkingPool,
    /// False once proxies are disabled, either by configuration or because
    /// the working pool ran dry.
    pub proxy_enabled: bool,
}

impl RetryState {
    pub fn new(pool: &ProxyPool, use_proxy: bool) -> Self {
        Self {
            retries: 0,
            pool: if use_proxy { pool.snapshot() } else { WorkingPool::empty() },
            proxy_enabled: use_proxy,
        }
    }

    /// Proxy for the next attempt. Disables proxy usage for the rest of the
    /// call once the working pool is empty.
    pub fn select_proxy(&mut self, chooser: &dyn Chooser, url: &str) -> Option<ProxyEndpoint> {
        if !self.proxy_enabled {
            return None;
        }
        match self.pool.choose(chooser) {
            Some(proxy) => Some(proxy.clone()),
            None => {
                warn!("Proxy pool exhausted for {}, continuing without proxy", url);
                self.proxy_enabled = false;
                None
            }
        }
    }

    /// Record a failed iteration: evict the proxy it used and count it.
    pub fn fail(mut self, proxy: Option<&ProxyEndpoint>) -> Self {
        if let Some(proxy) = proxy {
            if self.pool.evict(proxy) > 0 {
                warn!(
                    "Evicted proxy {} ({} left)",
                    proxy,
                    self.pool.len()
                );
            }
        }
        self.retries += 1;
        self
    }
}

/// Issues requests with bounded retries, proxy rotation and an optional
/// browser fallback.
///
/// A request ends either with a `200` [`Response`] or with a
/// [`FetchError`]; transport errors, blocked statuses and proxy exhaustion
/// are handled inside the retry loop.
pub struct Fetcher {
    config: FetcherConfig,
    pool: ProxyPool,
    standard: Arc<dyn Transport>,
    fallback: Option<Arc<dyn Transport>>,
    user_agents: Arc<dyn UserAgentSource>,
    chooser: Arc<dyn Chooser>,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    /// Create a fetcher with reqwest-backed transports.
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        FetcherBuilder::new(config).build()
    }

    pub fn builder(config: FetcherConfig) -> FetcherBuilder {
        FetcherBuilder::new(config)
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response, FetchError> {
        self.request(RequestSpec::get(url)).await
    }

    pub async fn post(&self, url: impl Into<String>, body: RequestBody) -> Result<Response, FetchError> {
        let mut spec = RequestSpec::post(url);
        spec.body = Some(body);
        self.request(spec).await
    }

    /// Run one request through the retry loop.
    pub async fn request(&self, spec: RequestSpec) -> Result<Response, FetchError> {
        let mut state = RetryState::new(&self.pool, self.config.use_proxy);

        while state.retries < self.config.max_retries {
            let headers = self.merge_headers(&spec.headers);
            let proxy = state.select_proxy(self.chooser.as_ref(), &spec.url);

            debug!(
                "Attempt {}/{} for {} via {}",
                state.retries + 1,
                self.config.max_retries,
                spec.url,
                proxy.as_ref().map_or_else(|| "direct".to_string(), ProxyEndpoint::redacted)
            );

            let attempt = Attempt {
                spec: &spec,
                headers: &headers,
                proxy: proxy.as_ref(),
            };
            if let Some(response) = self.try_attempt(attempt).await {
                return Ok(response);
            }

            let wait = backoff::delay(self.config.backoff_factor, state.retries);
            state = state.fail(proxy.as_ref());
            info!(
                "Attempt {}/{} for {} failed, retrying in {:.1}s",
                state.retries,
                self.config.max_retries,
                spec.url,
                wait.as_secs_f64()
            );
            self.sleeper.sleep(wait).await;
        }

        warn!("Failed to fetch {} after {} attempts", spec.url, state.retries);
        Err(FetchError::Exhausted {
            url: spec.url,
            attempts: state.retries,
        })
    }

    /// Like [`Fetcher::request`], but gives up with [`FetchError::Cancelled`]
    /// as soon as `cancel` resolves, dropping any in-flight attempt or sleep.
    pub async fn request_until<C>(&self, spec: RequestSpec, cancel: C) -> Result<Response, FetchError>
    where
        C: Future<Output = ()>,
    {
        let url = spec.url.clone();
        tokio::select! {
            biased;
            _ = cancel => {
                info!("Request to {} cancelled", url);
                Err(FetchError::Cancelled { url })
            }
            result = self.request(spec) => result,
        }
    }

    /// Run independent requests with at most `concurrency` in flight.
    /// Results are returned in input order.
    pub async fn fetch_all(
        &self,
        specs: Vec<RequestSpec>,
        concurrency: usize,
    ) -> Vec<Result<Response, FetchError>> {
        stream::iter(specs)
            .map(|spec| self.request(spec))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Defaults, then a fresh User-Agent, then the caller's headers.
    fn merge_headers(&self, caller: &HeaderMap) -> HeaderMap {
        let mut headers = self.config.default_headers.clone();
        let user_agent = HeaderValue::from_str(&self.user_agents.random())
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_USER_AGENT));
        headers.insert(USER_AGENT, user_agent);
        headers.extend(caller.clone());
        headers
    }

    /// Standard transport first, then the fallback on a blocked status.
    /// Returns the response only if one of them answered 200.
    async fn try_attempt(&self, attempt: Attempt<'_>) -> Option<Response> {
        let result = self.call(self.standard.as_ref(), attempt).await;
        let status = match result {
            AttemptResult::Response(response) if response.status == StatusCode::OK => {
                return Some(response)
            }
            AttemptResult::Response(response) => response.status,
            AttemptResult::Failed(_) => return None,
        };

        let fallback = self.fallback.as_ref().filter(|_| is_blocked(status))?;
        info!(
            "[{}] Block detected on {}, retrying with {} transport",
            status.as_u16(),
            attempt.spec.url,
            fallback.name()
        );
        match self.call(fallback.as_ref(), attempt).await {
            AttemptResult::Response(response) if response.status == StatusCode::OK => {
                info!("{} transport succeeded for {}", fallback.name(), attempt.spec.url);
                Some(response)
            }
            AttemptResult::Response(response) => {
                debug!(
                    "{} transport returned {} for {}",
                    fallback.name(),
                    response.status,
                    attempt.spec.url
                );
                None
            }
            AttemptResult::Failed(_) => None,
        }
    }

    /// One transport call, bounded by the configured timeout plus whatever
    /// setup time the transport declares.
    async fn call(&self, transport: &dyn Transport, attempt: Attempt<'_>) -> AttemptResult {
        let timeout = self.config.timeout + transport.setup_allowance();
        match tokio::time::timeout(timeout, transport.attempt(attempt)).await {
            Ok(result) => {
                if let AttemptResult::Failed(e) = &result {
                    debug!("{} attempt on {} failed: {}", transport.name(), attempt.spec.url, e);
                }
                result
            }
            Err(_) => {
                debug!("{} attempt on {} timed out", transport.name(), attempt.spec.url);
                AttemptResult::Failed(TransportError::TimedOut(timeout))
            }
        }
    }
}

/// Builder for [`Fetcher`] that allows replacing any collaborator.
pub struct FetcherBuilder {
    config: FetcherConfig,
    standard: Option<Arc<dyn Transport>>,
    fallback: Option<Arc<dyn Transport>>,
    user_agents: Option<Arc<dyn UserAgentSource>>,
    chooser: Option<Arc<dyn Chooser>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl FetcherBuilder {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            standard: None,
            fallback: None,
            user_agents: None,
            chooser: None,
            sleeper: None,
        }
    }

    pub fn standard_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.standard = Some(transport);
        self
    }

    /// Ignored when the configuration disables the fallback transport.
    pub fn fallback_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.fallback = Some(transport);
        self
    }

    pub fn user_agents(mut self, source: Arc<dyn UserAgentSource>) -> Self {
        self.user_agents = Some(source);
        self
    }

    /// Randomness used for proxy selection.
    pub fn chooser(mut self, chooser: Arc<dyn Chooser>) -> Self {
        self.chooser = Some(chooser);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Build the fetcher, creating reqwest transports for any not supplied.
    pub fn build(self) -> Result<Fetcher, reqwest::Error> {
        let timeout = self.config.timeout;

        let standard: Arc<dyn Transport> = match self.standard {
            Some(transport) => transport,
            None => Arc::new(StandardTransport::new(timeout)?),
        };

        let fallback: Option<Arc<dyn Transport>> = if self.config.enable_fallback_transport {
            match self.fallback {
                Some(transport) => Some(transport),
                None => Some(Arc::new(BrowserTransport::new(timeout)?)),
            }
        } else {
            None
        };

        let pool = ProxyPool::new(self.config.proxies.iter().cloned());
        if self.config.use_proxy && pool.is_empty() {
            warn!("Proxy usage enabled but no proxies configured");
        }

        Ok(Fetcher {
            pool,
            standard,
            fallback,
            user_agents: self
                .user_agents
                .unwrap_or_else(|| Arc::new(UserAgentList::builtin())),
            chooser: self.chooser.unwrap_or_else(|| Arc::new(ThreadRandom)),
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            config: self.config,
        })
    }
}
