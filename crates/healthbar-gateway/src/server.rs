//! Gateway router and request pipeline.
//!
//! ```text
//! request -> log_requests -> rate_limit
//!         -> envelope_method_not_allowed -> /health | / | /metrics
//!         -> proxy fallback
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use healthbar_core::envelope;
use healthbar_core::logging::{envelope_method_not_allowed, log_requests};
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::{self, PROBE_TIMEOUT};
use crate::metrics::{GatewayMetrics, MetricsError, UNMATCHED_ROUTE};
use crate::proxy::{Proxy, build_client};
use crate::rate_limit::{RateLimiter, client_key};
use crate::routes::RouteTable;

/// Name reported by the info endpoint.
pub const SERVICE_NAME: &str = "Health Bar API Gateway";

/// Paths served by the gateway itself. `GET` requests to these are not
/// charged against the rate limit.
const LOCAL_PATHS: [&str; 3] = ["/health", "/", "/metrics"];

/// Shared gateway state.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub routes: Arc<RouteTable>,
    pub limiter: Arc<RateLimiter>,
    pub proxy: Arc<Proxy>,
    pub metrics: Arc<GatewayMetrics>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Result<Self, MetricsError> {
        let routes = RouteTable::from_backends(&config.backends);
        let limiter = RateLimiter::new(config.rate_limit.limiter_config());
        let proxy = Proxy::new(build_client(), config.upstream_timeout());
        Ok(Self {
            routes: Arc::new(routes),
            limiter: Arc::new(limiter),
            proxy: Arc::new(proxy),
            metrics: Arc::new(GatewayMetrics::new()?),
            config: Arc::new(config),
        })
    }
}

/// Builds the gateway router.
///
/// The server must be started with
/// `into_make_service_with_connect_info::<SocketAddr>()` for requests without
/// forwarding headers to be keyed by peer address; otherwise they share the
/// `unknown` bucket.
///
/// Only the gateway's own routes get the 405 envelope rewrite. It is layered
/// before the proxy fallback is attached, so forwarded responses are
/// returned exactly as the backend sent them.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(info))
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        .layer(middleware::from_fn(envelope_method_not_allowed))
        .fallback(forward)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn is_local(request: &Request) -> bool {
    request.method() == Method::GET && LOCAL_PATHS.contains(&request.uri().path())
}

async fn rate_limit(State(state): State<GatewayState>, request: Request, next: Next) -> Response {
    if is_local(&request) {
        return next.run(request).await;
    }
    let key = client_key(request.headers(), peer_addr(&request));
    if let Err(e) = state.limiter.check(&key) {
        state.metrics.rate_limited();
        return e.into_response();
    }
    next.run(request).await
}

async fn forward(State(state): State<GatewayState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let Some(route) = state.routes.resolve(&path) else {
        state
            .metrics
            .request_completed(UNMATCHED_ROUTE, StatusCode::NOT_FOUND.as_u16());
        return GatewayError::ServiceNotFound(path).into_response();
    };

    let remote = peer_addr(&request);
    let response = match state.proxy.forward(route, request, remote).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    state
        .metrics
        .request_completed(route.name, response.status().as_u16());
    response
}

async fn health_check(State(state): State<GatewayState>) -> Response {
    let report = health::aggregate(state.proxy.client(), &state.routes, PROBE_TIMEOUT).await;
    let status = if report.all_healthy() {
        StatusCode::OK
    } else {
        tracing::warn!(services = ?report.services, "backend health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(report)).into_response()
}

#[derive(Debug, Serialize)]
struct GatewayInfo {
    service: &'static str,
    version: &'static str,
    endpoints: Vec<EndpointInfo>,
    rate_limit: RateLimitInfo,
}

#[derive(Debug, Serialize)]
struct EndpointInfo {
    service: &'static str,
    prefix: String,
}

#[derive(Debug, Serialize)]
struct RateLimitInfo {
    requests_per_second: f64,
    burst: u32,
}

async fn info(State(state): State<GatewayState>) -> Response {
    let limits = &state.config.rate_limit;
    let info = GatewayInfo {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: state
            .routes
            .iter()
            .map(|route| EndpointInfo {
                service: route.name,
                prefix: format!("{}/*", route.prefix),
            })
            .collect(),
        rate_limit: RateLimitInfo {
            requests_per_second: limits.requests_per_second,
            burst: limits.burst,
        },
    };
    envelope::success(StatusCode::OK, "Health Bar API Gateway", info)
}

async fn export_metrics(State(state): State<GatewayState>) -> Response {
    state
        .metrics
        .set_tracked_clients(state.limiter.tracked_clients());
    match state.metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            GatewayError::Internal(e.to_string()).into_response()
        },
    }
}
