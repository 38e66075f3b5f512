//! Middleware implementation for reqwest.

use crate::fetcher::Fetcher;
use crate::request::{RequestBody, RequestSpec};

use anyhow::anyhow;
use async_trait::async_trait;
use log::warn;
use reqwest::ResponseBuilderExt;
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends every request through a [`Fetcher`], so it gets
/// proxy rotation, backoff and the browser fallback.
///
/// The wrapped client's own transport is not used; the fetcher's transports
/// carry the request. Requests with streaming bodies are rejected.
///
/// The returned response is rebuilt from the fetcher's [`Response`]. Its
/// `url()` is the request URL, not the final URL after redirects, and
/// `remote_addr()` is always `None`.
///
/// [`Response`]: crate::Response
#[derive(Clone)]
pub struct ResilientMiddleware {
    fetcher: Arc<Fetcher>,
}

impl ResilientMiddleware {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    fn to_spec(req: &reqwest::Request) -> Result<RequestSpec> {
        let body = match req.body() {
            None => None,
            Some(body) => {
                let bytes = body.as_bytes().ok_or_else(|| {
                    Error::Middleware(anyhow!(
                        "Request body is not buffered. Are you passing a streaming body?"
                    ))
                })?;
                Some(RequestBody::Bytes(bytes.to_vec()))
            }
        };

        let mut spec = RequestSpec::new(req.method().clone(), req.url().as_str());
        spec.headers = req.headers().clone();
        spec.body = body;
        Ok(spec)
    }
}

#[async_trait]
impl Middleware for ResilientMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let spec = Self::to_spec(&req)?;

        match self.fetcher.request(spec).await {
            Ok(response) => {
                let mut http_response = http::Response::builder()
                    .url(req.url().clone())
                    .body(response.body)
                    .map_err(|e| Error::Middleware(anyhow!(e)))?;
                *http_response.status_mut() = response.status;
                *http_response.headers_mut() = response.headers;
                Ok(reqwest::Response::from(http_response))
            }
            Err(e) => {
                warn!("Resilient fetch failed: {}", e);
                Err(Error::Middleware(anyhow!(e)))
            }
        }
    }
}
