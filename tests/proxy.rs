//! Gateway tests: WAF in front of a live upstream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use axum::http::StatusCode;
use serde_json::{json, Value};

use storefront_waf::config::GatewayConfig;
use storefront_waf::{HttpServer, Shutdown};

mod common;

async fn start_gateway(upstream: SocketAddr) -> (SocketAddr, Shutdown) {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.address = upstream.to_string();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_clean_request_forwarded_with_body() {
    let (upstream, hits) = common::start_echo_backend().await;
    let (gateway, shutdown) = start_gateway(upstream).await;

    let res = client()
        .post(format!("http://{}/api/orders?ref=summer", gateway))
        .json(&json!({"name": "Safe User", "age": 30}))
        .send()
        .await
        .expect("Gateway unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let text = res.text().await.unwrap();
    assert!(text.starts_with("/api/orders?ref=summer "), "{}", text);
    assert!(text.contains("\"Safe User\""));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_blocked_request_never_reaches_upstream() {
    let (upstream, hits) = common::start_echo_backend().await;
    let (gateway, shutdown) = start_gateway(upstream).await;

    let res = client()
        .post(format!("http://{}/api/comments", gateway))
        .header("x-forwarded-for", "203.0.113.9")
        .json(&json!({"comment": "<script>alert(1)</script>"}))
        .send()
        .await
        .expect("Gateway unreachable");

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Forbidden");
    assert!(!body["message"].as_str().unwrap().contains("script"));

    let res = client()
        .get(format!("http://{}/resource?file=../../etc/passwd", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_down_is_bad_gateway() {
    let unused = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (gateway, shutdown) = start_gateway(unused).await;

    let res = client()
        .get(format!("http://{}/health", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_requests_scanned_independently() {
    let (upstream, hits) = common::start_echo_backend().await;
    let (gateway, shutdown) = start_gateway(upstream).await;
    let blocked = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let blocked = blocked.clone();
        tasks.push(tokio::spawn(async move {
            let payload = if i % 2 == 0 {
                json!({"items": [{"qty": i}, {"note": "UNION SELECT 1"}]})
            } else {
                json!({"items": [{"qty": i}, {"note": "matte"}]})
            };
            let res = client()
                .post(format!("http://{}/api/cart", gateway))
                .json(&payload)
                .send()
                .await
                .unwrap();
            if res.status() == StatusCode::FORBIDDEN {
                blocked.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(blocked.load(Ordering::SeqCst), 10);
    assert_eq!(hits.load(Ordering::SeqCst), 10);
    shutdown.trigger();
}
