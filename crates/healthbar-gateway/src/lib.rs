//! Health Bar API gateway.
//!
//! The gateway is the only public entry point. For every request it:
//!
//! 1. resolves a client key and charges one token from that client's bucket
//!    ([`rate_limit`]), answering 429 when the bucket is empty,
//! 2. resolves the backend by path prefix ([`routes`]), answering 404 when no
//!    prefix matches,
//! 3. streams the request to the backend and the response back ([`proxy`]),
//!    answering 503 when the backend cannot be reached.
//!
//! It also serves `GET /health` ([`health`]), a service index at `GET /`
//! and Prometheus metrics at `GET /metrics` ([`metrics`]). These three bypass
//! rate limiting.
//!
//! The gateway never inspects credentials. Identity headers are passed
//! through untouched; every backend overwrites them from the verified token.

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{GatewayState, build_router};
