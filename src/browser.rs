//! Anti-bot fallback transport.
//!
//! Behaves like a browser session: it keeps cookies between requests, sends
//! the full navigation header set and accepts compressed bodies. It also visits an
//! origin's front page once before its first request there. The warm-up
//! collects clearance and session cookies that challenge pages set.

use crate::request::Response;
use crate::transport::{build_request, execute, Attempt, AttemptResult, ClientCache, Transport};

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("upgrade-insecure-requests", "1"),
    ("cache-control", "max-age=0"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
];

/// Upper bound on the front-page visit, kept apart from the request deadline.
const DEFAULT_WARM_UP_TIMEOUT: Duration = Duration::from_secs(3);

/// Cookie-keeping browser-like transport used after a blocked response.
pub struct BrowserTransport {
    clients: ClientCache,
    warmed: Mutex<HashSet<String>>,
    warm_up_timeout: Duration,
}

impl BrowserTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            clients: ClientCache::new(timeout, |builder| {
                builder.cookie_store(true).gzip(true).brotli(true)
            })?,
            warmed: Mutex::new(HashSet::new()),
            warm_up_timeout: DEFAULT_WARM_UP_TIMEOUT.min(timeout),
        })
    }

    /// Set how long the front-page visit may take before it is abandoned.
    pub fn with_warm_up_timeout(mut self, timeout: Duration) -> Self {
        self.warm_up_timeout = timeout;
        self
    }

    /// Add browser navigation headers the attempt does not already carry.
    fn browser_headers(headers: &HeaderMap) -> HeaderMap {
        let mut merged = headers.clone();
        for &(name, value) in NAVIGATION_HEADERS {
            if !merged.contains_key(name) {
                merged.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
            }
        }
        merged
    }

    /// `scheme://host[:port]/` of the target, if it has one.
    fn origin_of(url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        match url.origin() {
            origin @ url::Origin::Tuple(..) => Some(format!("{}/", origin.ascii_serialization())),
            url::Origin::Opaque(_) => None,
        }
    }

    /// First visit to an origin through a given client: load the front page
    /// so the cookie store picks up whatever the site hands out. Bounded by
    /// `warm_up_timeout`; the origin counts as warmed only once it answered.
    async fn warm_up(&self, client: &reqwest::Client, attempt: &Attempt<'_>) {
        let Some(origin) = Self::origin_of(&attempt.spec.url) else {
            return;
        };
        let key = match attempt.proxy {
            Some(proxy) => format!("{}|{}", proxy.as_str(), origin),
            None => origin.clone(),
        };
        let already_warmed = self.warmed.lock().contains(&key);
        if already_warmed {
            return;
        }

        info!("Warming up browser session on {}", origin);
        let headers = Self::browser_headers(attempt.headers);
        let visit = async {
            let response = client
                .get(&origin)
                .headers(headers)
                .timeout(self.warm_up_timeout)
                .send()
                .await?;
            // Drain the body so the connection can be reused.
            Response::read(response).await
        };
        match tokio::time::timeout(self.warm_up_timeout, visit).await {
            Ok(Ok(response)) => {
                debug!("Warm-up of {} returned {}", origin, response.status);
                self.warmed.lock().insert(key);
            }
            Ok(Err(e)) => debug!("Warm-up of {} failed: {}", origin, e),
            Err(_) => debug!("Warm-up of {} timed out", origin),
        }
    }
}

#[async_trait]
impl Transport for BrowserTransport {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn setup_allowance(&self) -> Duration {
        self.warm_up_timeout
    }

    async fn attempt(&self, attempt: Attempt<'_>) -> AttemptResult {
        let client = match self.clients.client_for(attempt.proxy) {
            Ok(client) => client,
            Err(e) => {
                debug!("browser transport could not build client: {}", e);
                return AttemptResult::Failed(e);
            }
        };

        self.warm_up(&client, &attempt).await;

        let headers = Self::browser_headers(attempt.headers);
        let attempt = Attempt {
            headers: &headers,
            ..attempt
        };
        execute(self.name(), build_request(&client, &attempt)).await
    }
}
