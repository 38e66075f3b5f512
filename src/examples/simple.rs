//! Simple example of using reqwest-resilient.

use reqwest_middleware::ClientBuilder;
use reqwest_resilient::{Fetcher, FetcherConfig, ResilientMiddleware, RequestSpec};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = FetcherConfig::builder()
        .header("Accept-Language", "es-AR,es;q=0.9")
        .header("Connection", "keep-alive")
        // proxies are optional; leave use_proxy off to go direct
        .proxies(vec!["http://127.0.0.1:3128"])
        .use_proxy(false)
        .max_retries(3)
        .backoff_factor(0.5)
        .timeout(Duration::from_secs(10))
        .enable_fallback_transport(true)
        .build()?;

    let fetcher = Arc::new(Fetcher::new(config)?);

    println!("Fetching chart page...");
    match fetcher.request(RequestSpec::get("https://www.imdb.com/es/chart/top/")).await {
        Ok(response) => println!("Status: {}, {} bytes", response.status, response.body.len()),
        Err(e) => println!("Gave up: {}", e),
    }

    // The same fetcher behind a reqwest-middleware client.
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ResilientMiddleware::new(Arc::clone(&fetcher)))
        .build();

    let response = client.get("https://httpbin.org/headers").send().await?;
    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}
