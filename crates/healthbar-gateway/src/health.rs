//! Backend liveness aggregation for `GET /health`.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::proxy::HttpClient;
use crate::routes::RouteTable;

/// Per-probe deadline.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Path every backend serves for liveness.
pub const PROBE_PATH: &str = "/healthz";

/// Liveness of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub success: bool,
    pub services: BTreeMap<String, ServiceHealth>,
}

impl HealthReport {
    #[must_use]
    pub fn all_healthy(&self) -> bool {
        self.success
    }
}

/// Probes `base_url`. Transport errors, timeouts and 5xx answers count as
/// unhealthy.
pub async fn probe(client: &HttpClient, base_url: &str, timeout: Duration) -> ServiceHealth {
    let request = match Request::builder()
        .method(Method::GET)
        .uri(format!("{base_url}{PROBE_PATH}"))
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(base_url, error = %e, "invalid probe URL");
            return ServiceHealth::Unhealthy;
        },
    };

    match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) if !response.status().is_server_error() => ServiceHealth::Healthy,
        Ok(Ok(response)) => {
            tracing::debug!(base_url, status = %response.status(), "probe failed");
            ServiceHealth::Unhealthy
        },
        Ok(Err(e)) => {
            tracing::debug!(base_url, error = %e, "probe failed");
            ServiceHealth::Unhealthy
        },
        Err(_) => {
            tracing::debug!(base_url, "probe timed out");
            ServiceHealth::Unhealthy
        },
    }
}

/// Probes every backend in `routes` concurrently.
pub async fn aggregate(client: &HttpClient, routes: &RouteTable, timeout: Duration) -> HealthReport {
    let probes = routes.iter().map(|route| async move {
        (
            route.name.to_string(),
            probe(client, &route.upstream, timeout).await,
        )
    });
    let services: BTreeMap<_, _> = join_all(probes).await.into_iter().collect();
    let success = services
        .values()
        .all(|health| *health == ServiceHealth::Healthy);
    HealthReport { success, services }
}
