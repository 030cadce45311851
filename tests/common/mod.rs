//! Shared utilities for integration tests.

use axum::{body::Bytes, http::Uri, routing::any, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Start a mock storefront that echoes the request URI and body.
///
/// Returns its address and a counter of requests it has served.
pub async fn start_echo_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    let app = Router::new().fallback(any(move |uri: Uri, body: Bytes| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("{} {}", uri, String::from_utf8_lossy(&body))
        }
    }));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, hits)
}
