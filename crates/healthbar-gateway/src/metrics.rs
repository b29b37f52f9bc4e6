//! Prometheus metrics for the gateway.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `healthbar_gateway_requests_total` | Counter | `route`, `status` |
//! | `healthbar_gateway_rate_limited_total` | Counter | |
//! | `healthbar_gateway_tracked_clients` | Gauge | |
//!
//! `route` is the backend name, or `unmatched` for paths no backend owns.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Route label for requests that matched no backend.
pub const UNMATCHED_ROUTE: &str = "unmatched";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Gateway metrics and the registry they are exported from.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    rate_limited_total: IntCounter,
    tracked_clients: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "healthbar_gateway_requests_total",
                "Requests answered by the gateway",
            ),
            &["route", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let rate_limited_total = IntCounter::new(
            "healthbar_gateway_rate_limited_total",
            "Requests rejected by the rate limiter",
        )?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        let tracked_clients = IntGauge::new(
            "healthbar_gateway_tracked_clients",
            "Clients currently holding a token bucket",
        )?;
        registry.register(Box::new(tracked_clients.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            tracked_clients,
        })
    }

    pub fn request_completed(&self, route: &str, status: u16) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    #[must_use]
    pub fn request_count(&self, route: &str, status: u16) -> u64 {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .get()
    }

    pub fn rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    #[must_use]
    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited_total.get()
    }

    pub fn set_tracked_clients(&self, count: usize) {
        self.tracked_clients
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
