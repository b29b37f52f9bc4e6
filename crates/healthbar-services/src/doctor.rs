//! Doctor profiles and the doctor's view of patients.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use healthbar_core::envelope;
use healthbar_core::error::ApiError;
use healthbar_core::extract::{JsonBody, QueryParams};
use healthbar_core::guard::AccessMode;
use healthbar_core::model::{DoctorProfileInput, Role};
use healthbar_core::store::StoreError;
use healthbar_core::trust::AuthContext;
use serde::Deserialize;

use crate::ServiceState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileRequest {
    full_name: String,
    specialization: String,
    license_number: String,
    phone: String,
}

impl From<ProfileRequest> for DoctorProfileInput {
    fn from(req: ProfileRequest) -> Self {
        Self {
            full_name: req.full_name,
            specialization: req.specialization,
            license_number: req.license_number,
            phone: req.phone,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatientQuery {
    patient_id: String,
}

pub fn router(state: ServiceState) -> Router {
    let routes = Router::new()
        .route(
            "/api/doctors/profile",
            post(create_profile).get(get_profile).put(update_profile),
        )
        .route("/api/doctors/patients", get(list_patients))
        .route("/api/doctors/patients/view", get(view_patient));
    crate::protect(routes, &state).with_state(state)
}

async fn create_profile(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Doctor, "Only doctors can create doctor profiles")?;
    if req.full_name.is_empty() {
        return Err(ApiError::bad_request("Full name is required"));
    }

    match state.doctors.create(ctx.user_id, req.into()).await {
        Ok(profile) => Ok(envelope::success(
            StatusCode::CREATED,
            "Profile created successfully",
            profile,
        )),
        Err(StoreError::Conflict(_)) => Err(ApiError::Conflict("Profile already exists".into())),
        Err(e) => Err(ApiError::internal("Failed to create profile", &e)),
    }
}

async fn get_profile(
    State(state): State<ServiceState>,
    ctx: AuthContext,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Doctor, "Only doctors can view their profile")?;
    let profile = state
        .doctors
        .get_by_user(ctx.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(envelope::success(StatusCode::OK, "Profile retrieved", profile))
}

async fn update_profile(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Doctor, "Only doctors can update their profile")?;
    let profile = state
        .doctors
        .update(ctx.user_id, req.into())
        .await
        .map_err(|e| ApiError::internal("Failed to update profile", &e))?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(envelope::success(
        StatusCode::OK,
        "Profile updated successfully",
        profile,
    ))
}

async fn list_patients(
    State(state): State<ServiceState>,
    ctx: AuthContext,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Doctor, "Only doctors can view patient list")?;
    let doctor_id = state.own_doctor_profile(&ctx).await?;
    let patients = state
        .doctors
        .accessible_patients(doctor_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve patients", &e))?;
    Ok(envelope::success(StatusCode::OK, "Patients retrieved", patients))
}

async fn view_patient(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<PatientQuery>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Doctor, "Only doctors can view patient profiles")?;
    state.own_doctor_profile(&ctx).await?;
    if query.patient_id.is_empty() {
        return Err(ApiError::bad_request("Patient ID is required"));
    }

    state
        .guard
        .check(&ctx, &query.patient_id, AccessMode::Read)
        .await?;
    let profile = state
        .patients
        .get_by_id(query.patient_id)
        .await?
        .ok_or_else(ApiError::access_denied)?;
    Ok(envelope::success(
        StatusCode::OK,
        "Patient profile retrieved",
        profile,
    ))
}
