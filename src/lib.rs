//! # reqwest-resilient
//!
//! A retrying request core for scrapers built on reqwest.
//!
//! Every request runs through a bounded retry loop. Each attempt gets a
//! freshly randomized browser user-agent and, optionally, a proxy drawn from
//! a per-request working pool. A proxy that fails is evicted for the rest of
//! that request. Blocked responses (403, 429, 503) are replayed once through a
//! cookie-keeping browser-like transport, and failed iterations back off
//! exponentially. Callers get either a `200` response or a [`FetchError`].

pub mod backoff;
pub mod browser;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod random;
pub mod request;
pub mod transport;
pub mod user_agent;
mod utils;

pub use backoff::{NoSleep, Sleeper, TokioSleeper};
pub use browser::BrowserTransport;
pub use config::{FetcherConfig, FetcherConfigBuilder};
pub use error::{ConfigError, FetchError, SourceError, TransportError};
pub use fetcher::{is_blocked, Fetcher, FetcherBuilder, RetryState};
pub use middleware::ResilientMiddleware;
pub use pool::{ProxyPool, WorkingPool};
pub use proxy::ProxyEndpoint;
pub use random::{Chooser, SeededRandom, ThreadRandom};
pub use request::{RequestBody, RequestSpec, Response};
pub use transport::{Attempt, AttemptResult, StandardTransport, Transport};
pub use user_agent::{UserAgentList, UserAgentSource, FALLBACK_USER_AGENT};
