//! Health Bar backend services.
//!
//! Five small HTTP services share one database and one token secret:
//!
//! | Service        | Prefix               | Default port |
//! |----------------|----------------------|--------------|
//! | auth           | `/api/auth`          | 8001         |
//! | patient        | `/api/patients`      | 8002         |
//! | doctor         | `/api/doctors`       | 8003         |
//! | timeline       | `/api/timeline`      | 8004         |
//! | prescription   | `/api/prescriptions` | 8005         |
//!
//! Each service is an axum [`Router`] built by [`app`]. Every router also
//! serves `GET /healthz` for the gateway's health probe and answers unknown
//! paths with a 404 envelope.

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::get;
use healthbar_core::envelope;
use healthbar_core::logging::{envelope_method_not_allowed, log_requests};
use healthbar_core::trust::require_auth;

pub mod auth;
pub mod doctor;
pub mod patient;
pub mod prescription;
pub mod state;
pub mod timeline;

pub use state::ServiceState;

/// Which backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    Auth,
    Patient,
    Doctor,
    Timeline,
    Prescription,
}

impl ServiceKind {
    /// Every service, in gateway routing order.
    pub const ALL: [Self; 5] = [
        Self::Auth,
        Self::Patient,
        Self::Doctor,
        Self::Timeline,
        Self::Prescription,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Patient => "patient",
            Self::Doctor => "doctor",
            Self::Timeline => "timeline",
            Self::Prescription => "prescription",
        }
    }

    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Auth => 8001,
            Self::Patient => 8002,
            Self::Doctor => 8003,
            Self::Timeline => 8004,
            Self::Prescription => 8005,
        }
    }
}

/// Builds the complete router for `kind`.
pub fn app(kind: ServiceKind, state: ServiceState) -> Router {
    let api = match kind {
        ServiceKind::Auth => auth::router(state),
        ServiceKind::Patient => patient::router(state),
        ServiceKind::Doctor => doctor::router(state),
        ServiceKind::Timeline => timeline::router(state),
        ServiceKind::Prescription => prescription::router(state),
    };
    api.route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(middleware::from_fn(envelope_method_not_allowed))
        .layer(middleware::from_fn(log_requests))
}

/// Applies the identity propagator to every route added so far.
pub(crate) fn protect(router: Router<ServiceState>, state: &ServiceState) -> Router<ServiceState> {
    router.route_layer(middleware::from_fn_with_state(
        state.verifier.clone(),
        require_auth,
    ))
}

async fn healthz() -> Response {
    envelope::message(StatusCode::OK, "OK")
}

async fn not_found() -> Response {
    envelope::failure(StatusCode::NOT_FOUND, "Not found")
}
