//! Hospital visit timeline.
//!
//! Patients own their visits. Doctors with an active grant may read a
//! patient's timeline and individual visits but never change them.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use healthbar_core::envelope;
use healthbar_core::error::ApiError;
use healthbar_core::extract::{JsonBody, QueryParams};
use healthbar_core::guard::AccessMode;
use healthbar_core::model::{HospitalVisit, Role, VisitInput, parse_date};
use healthbar_core::trust::AuthContext;
use serde::Deserialize;

use crate::ServiceState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VisitRequest {
    hospital_name: String,
    visit_date: String,
    reason: String,
    notes: String,
}

impl VisitRequest {
    fn into_input(self) -> Result<VisitInput, ApiError> {
        if self.hospital_name.is_empty() || self.visit_date.is_empty() || self.reason.is_empty() {
            return Err(ApiError::bad_request(
                "Hospital name, visit date, and reason are required",
            ));
        }
        let visit_date = parse_date(&self.visit_date)
            .ok_or_else(|| ApiError::bad_request("Invalid date format. Use YYYY-MM-DD"))?;
        Ok(VisitInput {
            hospital_name: self.hospital_name,
            visit_date,
            reason: self.reason,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatientQuery {
    patient_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VisitQuery {
    visit_id: String,
}

pub fn router(state: ServiceState) -> Router {
    let routes = Router::new()
        .route("/api/timeline/visits", post(add_visit))
        .route("/api/timeline/my", get(my_timeline))
        .route("/api/timeline/patient", get(patient_timeline))
        .route(
            "/api/timeline/visit",
            get(get_visit).put(update_visit).delete(delete_visit),
        );
    crate::protect(routes, &state).with_state(state)
}

async fn add_visit(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<VisitRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can add hospital visits")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    let input = req.into_input()?;
    state
        .guard
        .check(&ctx, &patient_id, AccessMode::Write)
        .await?;

    let visit = state
        .timeline
        .create(patient_id, input)
        .await
        .map_err(|e| ApiError::internal("Failed to add visit", &e))?;
    Ok(envelope::success(
        StatusCode::CREATED,
        "Visit added successfully",
        visit,
    ))
}

async fn my_timeline(
    State(state): State<ServiceState>,
    ctx: AuthContext,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can view their timeline")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    timeline_for(&state, &ctx, patient_id).await
}

async fn patient_timeline(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<PatientQuery>,
) -> Result<Response, ApiError> {
    if query.patient_id.is_empty() {
        return Err(ApiError::bad_request("Patient ID is required"));
    }
    timeline_for(&state, &ctx, query.patient_id).await
}

async fn timeline_for(
    state: &ServiceState,
    ctx: &AuthContext,
    patient_id: String,
) -> Result<Response, ApiError> {
    state
        .guard
        .check(ctx, &patient_id, AccessMode::Read)
        .await?;
    let visits = state
        .timeline
        .list_for_patient(patient_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve timeline", &e))?;
    Ok(envelope::success(StatusCode::OK, "Timeline retrieved", visits))
}

/// Loads a visit and checks the caller's access to its owner.
async fn authorized_visit(
    state: &ServiceState,
    ctx: &AuthContext,
    visit_id: String,
    mode: AccessMode,
) -> Result<HospitalVisit, ApiError> {
    if visit_id.is_empty() {
        return Err(ApiError::bad_request("Visit ID is required"));
    }
    let visit = state
        .timeline
        .get(visit_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Visit not found"))?;
    state.guard.check(ctx, &visit.patient_id, mode).await?;
    Ok(visit)
}

async fn get_visit(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<VisitQuery>,
) -> Result<Response, ApiError> {
    let visit = authorized_visit(&state, &ctx, query.visit_id, AccessMode::Read).await?;
    Ok(envelope::success(StatusCode::OK, "Visit retrieved", visit))
}

async fn update_visit(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<VisitQuery>,
    JsonBody(req): JsonBody<VisitRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can update visits")?;
    let visit = authorized_visit(&state, &ctx, query.visit_id, AccessMode::Write).await?;
    let input = req.into_input()?;

    let updated = state
        .timeline
        .update(visit.id, input)
        .await
        .map_err(|e| ApiError::internal("Failed to update visit", &e))?
        .ok_or_else(|| ApiError::not_found("Visit not found"))?;
    Ok(envelope::success(
        StatusCode::OK,
        "Visit updated successfully",
        updated,
    ))
}

async fn delete_visit(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<VisitQuery>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can delete visits")?;
    let visit = authorized_visit(&state, &ctx, query.visit_id, AccessMode::Write).await?;

    let deleted = state
        .timeline
        .delete(visit.id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete visit", &e))?;
    if !deleted {
        return Err(ApiError::not_found("Visit not found"));
    }
    Ok(envelope::message(StatusCode::OK, "Visit deleted successfully"))
}
