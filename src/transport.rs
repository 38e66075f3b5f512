//! Single-attempt HTTP transports.

use crate::error::TransportError;
use crate::proxy::ProxyEndpoint;
use crate::request::{RequestBody, RequestSpec, Response};

use async_trait::async_trait;
use http::HeaderMap;
use log::debug;
use parking_lot::Mutex;
use reqwest::{Client, ClientBuilder};
use std::collections::HashMap;
use std::time::Duration;

/// One attempt: the caller's request plus the merged headers and the proxy
/// chosen for this iteration.
#[derive(Debug, Clone, Copy)]
pub struct Attempt<'a> {
    pub spec: &'a RequestSpec,
    pub headers: &'a HeaderMap,
    pub proxy: Option<&'a ProxyEndpoint>,
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum AttemptResult {
    /// A response arrived, whatever its status.
    Response(Response),
    /// No usable response: timeout, refused connection, DNS or decode failure.
    Failed(TransportError),
}

impl AttemptResult {
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            AttemptResult::Response(response) => Some(response.status),
            AttemptResult::Failed(_) => None,
        }
    }
}

/// Performs exactly one HTTP attempt. Implementations apply their own
/// timeout, never retry, and report network errors as
/// [`AttemptResult::Failed`] instead of returning an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Extra time an attempt may spend on setup before the request itself,
    /// granted on top of the per-attempt timeout.
    fn setup_allowance(&self) -> Duration {
        Duration::ZERO
    }

    async fn attempt(&self, attempt: Attempt<'_>) -> AttemptResult;
}

/// reqwest clients keyed by proxy endpoint, built on first use.
pub(crate) struct ClientCache {
    direct: Client,
    proxied: Mutex<HashMap<ProxyEndpoint, Client>>,
    configure: fn(ClientBuilder) -> ClientBuilder,
    timeout: Duration,
}

impl ClientCache {
    pub(crate) fn new(
        timeout: Duration,
        configure: fn(ClientBuilder) -> ClientBuilder,
    ) -> Result<Self, reqwest::Error> {
        // Direct means direct: ignore HTTP_PROXY and friends from the environment.
        let direct = configure(Client::builder().timeout(timeout).no_proxy()).build()?;
        Ok(Self {
            direct,
            proxied: Mutex::new(HashMap::new()),
            configure,
            timeout,
        })
    }

    pub(crate) fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        if let Some(client) = self.proxied.lock().get(proxy) {
            return Ok(client.clone());
        }

        let reqwest_proxy = proxy.to_reqwest_proxy().map_err(|source| TransportError::InvalidProxy {
            proxy: proxy.redacted(),
            source,
        })?;
        let client = (self.configure)(Client::builder().timeout(self.timeout).proxy(reqwest_proxy)).build()?;

        self.proxied.lock().insert(proxy.clone(), client.clone());
        Ok(client)
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Build the reqwest request for an attempt.
pub(crate) fn build_request(client: &Client, attempt: &Attempt<'_>) -> reqwest::RequestBuilder {
    let spec = attempt.spec;
    let mut builder = client
        .request(spec.method.clone(), &spec.url)
        .headers(attempt.headers.clone());
    if !spec.params.is_empty() {
        builder = builder.query(&spec.params);
    }
    match &spec.body {
        Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
        Some(RequestBody::Form(fields)) => builder.form(fields),
        None => builder,
    }
}

/// Send a request and read the whole body, folding every error into the
/// failure sentinel.
pub(crate) async fn execute(name: &str, request: reqwest::RequestBuilder) -> AttemptResult {
    let result = async {
        let response = request.send().await?;
        Response::read(response).await
    }
    .await;

    match result {
        Ok(response) => AttemptResult::Response(response),
        Err(e) => {
            debug!("{} transport error: {}", name, e);
            AttemptResult::Failed(TransportError::Client(e))
        }
    }
}

/// Plain reqwest session; the primary transport.
pub struct StandardTransport {
    clients: ClientCache,
}

impl StandardTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            clients: ClientCache::new(timeout, |builder| builder)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.clients.timeout()
    }
}

#[async_trait]
impl Transport for StandardTransport {
    fn name(&self) -> &'static str {
        "standard"
    }

    async fn attempt(&self, attempt: Attempt<'_>) -> AttemptResult {
        let client = match self.clients.client_for(attempt.proxy) {
            Ok(client) => client,
            Err(e) => {
                debug!("standard transport could not build client: {}", e);
                return AttemptResult::Failed(e);
            }
        };
        execute(self.name(), build_request(&client, &attempt)).await
    }
}
