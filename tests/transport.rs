use async_trait::async_trait;
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest_resilient::{
    Attempt, AttemptResult, BrowserTransport, Fetcher, FetcherConfig, NoSleep, ProxyEndpoint,
    RequestSpec, Response, StandardTransport, Transport,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Minimal HTTP/1.1 server answering every connection with `status` and
/// `body`. The raw request heads are counted and kept.
async fn serve(status: u16, body: &'static str) -> (SocketAddr, Arc<AtomicUsize>, Arc<parking_lot::Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let heads = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let (hits_srv, heads_srv) = (hits.clone(), heads.clone());
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let hits = hits_srv.clone();
            let heads = heads_srv.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                hits.fetch_add(1, Ordering::SeqCst);
                heads.lock().push(String::from_utf8_lossy(&buf).into_owned());

                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits, heads)
}

/// Accepts connections and never answers.
async fn silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    addr
}

/// Never answers `GET /` but serves 200 on every other path. Returns the
/// number of front-page requests seen.
async fn hangs_on_front_page() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let front_page = Arc::new(AtomicUsize::new(0));

    let front_page_srv = front_page.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let front_page = front_page_srv.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                if buf.starts_with(b"GET / ") {
                    front_page.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    return;
                }
                let reply = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nchart";
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, front_page)
}

/// Standard transport that is always turned away.
struct Blocked;

#[async_trait]
impl Transport for Blocked {
    fn name(&self) -> &'static str {
        "blocked"
    }

    async fn attempt(&self, _attempt: Attempt<'_>) -> AttemptResult {
        AttemptResult::Response(Response::new(StatusCode::FORBIDDEN, HeaderMap::new(), Vec::new()))
    }
}

fn headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 test"));
    headers
}

#[tokio::test]
async fn standard_transport_reads_status_and_body() {
    let (addr, hits, heads) = serve(200, "chart").await;
    let transport = StandardTransport::new(Duration::from_secs(5)).unwrap();
    let spec = RequestSpec::get(format!("http://{}/es/chart/top/", addr)).query("ref", "nav");
    let headers = headers();

    let result = transport
        .attempt(Attempt {
            spec: &spec,
            headers: &headers,
            proxy: None,
        })
        .await;

    match result {
        AttemptResult::Response(response) => {
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.text(), "chart");
        }
        AttemptResult::Failed(e) => panic!("unexpected failure: {}", e),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let head = heads.lock()[0].to_lowercase();
    assert!(head.starts_with("get /es/chart/top/?ref=nav "));
    assert!(head.contains("user-agent: mozilla/5.0 test"));
}

#[tokio::test]
async fn non_200_statuses_are_responses_not_failures() {
    let (addr, _, _) = serve(503, "busy").await;
    let transport = StandardTransport::new(Duration::from_secs(5)).unwrap();
    let spec = RequestSpec::get(format!("http://{}/", addr));
    let headers = headers();

    let result = transport
        .attempt(Attempt {
            spec: &spec,
            headers: &headers,
            proxy: None,
        })
        .await;

    assert_eq!(result.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn silent_server_times_out_as_failure() {
    let addr = silent().await;
    let transport = StandardTransport::new(Duration::from_millis(200)).unwrap();
    let spec = RequestSpec::get(format!("http://{}/", addr));
    let headers = headers();

    let result = transport
        .attempt(Attempt {
            spec: &spec,
            headers: &headers,
            proxy: None,
        })
        .await;

    assert!(matches!(result, AttemptResult::Failed(_)));
}

#[tokio::test]
async fn refused_connection_is_a_failure() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let transport = StandardTransport::new(Duration::from_secs(2)).unwrap();
    let spec = RequestSpec::get(format!("http://{}/", addr));
    let headers = headers();

    let result = transport
        .attempt(Attempt {
            spec: &spec,
            headers: &headers,
            proxy: None,
        })
        .await;

    assert!(result.status().is_none());
}

#[tokio::test]
async fn requests_go_through_the_given_proxy() {
    // An HTTP proxy receives the absolute target URL in the request line.
    let (proxy_addr, hits, heads) = serve(200, "via proxy").await;
    let transport = StandardTransport::new(Duration::from_secs(5)).unwrap();
    let spec = RequestSpec::get("http://chart.invalid/top");
    let headers = headers();
    let proxy = ProxyEndpoint::new(proxy_addr.to_string());

    let result = transport
        .attempt(Attempt {
            spec: &spec,
            headers: &headers,
            proxy: Some(&proxy),
        })
        .await;

    assert_eq!(result.status(), Some(StatusCode::OK));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(heads.lock()[0].starts_with("GET http://chart.invalid/top "));
}

#[tokio::test]
async fn browser_transport_warms_up_once_per_origin() {
    let (addr, hits, heads) = serve(200, "ok").await;
    let transport = BrowserTransport::new(Duration::from_secs(5)).unwrap();
    let headers = headers();

    for path in ["/a", "/b"] {
        let spec = RequestSpec::get(format!("http://{}{}", addr, path));
        let result = transport
            .attempt(Attempt {
                spec: &spec,
                headers: &headers,
                proxy: None,
            })
            .await;
        assert_eq!(result.status(), Some(StatusCode::OK));
    }

    // warm-up of "/" plus the two targets
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    let heads = heads.lock();
    assert!(heads[0].starts_with("GET / "));
    assert!(heads[1].to_lowercase().contains("sec-fetch-mode: navigate"));
}

#[tokio::test]
async fn fetcher_against_real_server() {
    let (addr, hits, _) = serve(500, "boom").await;
    let config = FetcherConfig::builder()
        .max_retries(3)
        .backoff_factor(0.0)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let fetcher = Fetcher::builder(config)
        .sleeper(Arc::new(NoSleep))
        .build()
        .unwrap();

    let result = fetcher.get(format!("http://{}/", addr)).await;

    assert!(result.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn slow_warm_up_leaves_time_for_the_request() {
    let (addr, front_page) = hangs_on_front_page().await;
    let config = FetcherConfig::builder()
        .max_retries(1)
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let fetcher = Fetcher::builder(config)
        .standard_transport(Arc::new(Blocked))
        .sleeper(Arc::new(NoSleep))
        .build()
        .unwrap();

    let response = fetcher.get(format!("http://{}/chart", addr)).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "chart");
    assert_eq!(front_page.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_warm_up_is_tried_again() {
    let (addr, front_page) = hangs_on_front_page().await;
    let transport = BrowserTransport::new(Duration::from_secs(5))
        .unwrap()
        .with_warm_up_timeout(Duration::from_millis(200));
    let spec = RequestSpec::get(format!("http://{}/chart", addr));
    let headers = headers();

    for _ in 0..2 {
        let result = transport
            .attempt(Attempt {
                spec: &spec,
                headers: &headers,
                proxy: None,
            })
            .await;
        assert_eq!(result.status(), Some(StatusCode::OK));
    }

    assert_eq!(front_page.load(Ordering::SeqCst), 2);
}
