//! HTTP server setup and upstream forwarding.
//!
//! # Responsibilities
//! - Create the Axum router with the WAF gate in front of every route
//! - Wire up middleware (tracing, request ID, timeout)
//! - Forward allowed requests to the storefront upstream
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{self, HeaderValue},
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::waf::{waf_middleware, WafState};

/// Application state injected into the forwarding handler.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Authority,
    pub client: Client<HttpConnector, Body>,
}

/// The WAF gateway: inspects every request, forwards the clean ones.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new server for the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let upstream = Authority::from_str(&config.upstream.address).map_err(|source| {
            GatewayError::Upstream {
                address: config.upstream.address.clone(),
                source,
            }
        })?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { upstream, client };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let waf = WafState::new(config.waf.clone());

        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(waf, waf_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.upstream.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            waf_enabled = self.config.waf.enabled,
            max_depth = self.config.waf.max_depth,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Forward a request that passed the gate to the upstream.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Could not build upstream URI");
            metrics::record_request(&method, 502, start_time);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };
    if let Ok(host) = HeaderValue::from_str(state.upstream.as_str()) {
        parts.headers.insert(header::HOST, host);
    }

    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    tracing::debug!(request_id = %request_id, method = %method, uri = %parts.uri, "Forwarding request");

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                upstream = %state.upstream,
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
