//! Patient profile and access grant management.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{delete, get, post};
use healthbar_core::envelope;
use healthbar_core::error::ApiError;
use healthbar_core::extract::{JsonBody, QueryParams};
use healthbar_core::guard::AccessMode;
use healthbar_core::model::{PatientProfileInput, Role, parse_date};
use healthbar_core::permissions::PermissionStore;
use healthbar_core::store::StoreError;
use healthbar_core::trust::AuthContext;
use serde::Deserialize;

use crate::ServiceState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileRequest {
    full_name: String,
    date_of_birth: String,
    gender: String,
    phone: String,
    address: String,
}

impl ProfileRequest {
    fn into_input(self) -> Result<PatientProfileInput, ApiError> {
        let date_of_birth = parse_date(&self.date_of_birth)
            .ok_or_else(|| ApiError::bad_request("Invalid date format. Use YYYY-MM-DD"))?;
        Ok(PatientProfileInput {
            full_name: self.full_name,
            date_of_birth,
            gender: self.gender,
            phone: self.phone,
            address: self.address,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrantRequest {
    doctor_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RevokeQuery {
    doctor_id: String,
}

pub fn router(state: ServiceState) -> Router {
    let routes = Router::new()
        .route(
            "/api/patients/profile",
            post(create_profile).get(get_profile).put(update_profile),
        )
        .route("/api/patients/permissions", get(list_permissions))
        .route("/api/patients/permissions/grant", post(grant_access))
        .route("/api/patients/permissions/revoke", delete(revoke_access));
    crate::protect(routes, &state).with_state(state)
}

async fn create_profile(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can create patient profiles")?;
    if req.full_name.is_empty() || req.date_of_birth.is_empty() {
        return Err(ApiError::bad_request(
            "Full name and date of birth are required",
        ));
    }
    let input = req.into_input()?;

    match state.patients.create(ctx.user_id, input).await {
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
    ctx.require_role(Role::Patient, "Only patients can view their profile")?;
    let patient_id = checked_own_profile(&state, &ctx, AccessMode::Read).await?;
    let profile = state
        .patients
        .get_by_id(patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(envelope::success(StatusCode::OK, "Profile retrieved", profile))
}

async fn update_profile(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can update their profile")?;
    let input = req.into_input()?;
    checked_own_profile(&state, &ctx, AccessMode::Write).await?;
    let profile = state
        .patients
        .update(ctx.user_id, input)
        .await
        .map_err(|e| ApiError::internal("Failed to update profile", &e))?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(envelope::success(
        StatusCode::OK,
        "Profile updated successfully",
        profile,
    ))
}

/// The caller's own profile id, after the guard has cleared `mode` on it.
async fn checked_own_profile(
    state: &ServiceState,
    ctx: &AuthContext,
    mode: AccessMode,
) -> Result<String, ApiError> {
    let patient_id = state
        .patients
        .profile_id_for_user(ctx.user_id.clone())
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    state.guard.check(ctx, &patient_id, mode).await?;
    Ok(patient_id)
}

async fn grant_access(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<GrantRequest>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can grant access")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    if req.doctor_id.is_empty() {
        return Err(ApiError::bad_request("Doctor ID is required"));
    }

    match state.permissions.grant(&patient_id, &req.doctor_id).await {
        Ok(grant) => {
            tracing::info!(patient_id = %patient_id, doctor_id = %req.doctor_id, "access granted");
            Ok(envelope::success(
                StatusCode::OK,
                "Access granted successfully",
                grant,
            ))
        },
        Err(StoreError::NotFound) => Err(ApiError::not_found("Doctor not found")),
        Err(e) => Err(ApiError::internal("Failed to grant access", &e)),
    }
}

async fn revoke_access(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<RevokeQuery>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can revoke access")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    if query.doctor_id.is_empty() {
        return Err(ApiError::bad_request("Doctor ID is required"));
    }

    state
        .permissions
        .revoke(&patient_id, &query.doctor_id)
        .await
        .map_err(|e| ApiError::internal("Failed to revoke access", &e))?;
    tracing::info!(patient_id = %patient_id, doctor_id = %query.doctor_id, "access revoked");
    Ok(envelope::message(StatusCode::OK, "Access revoked successfully"))
}

async fn list_permissions(
    State(state): State<ServiceState>,
    ctx: AuthContext,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can view permissions")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    let grants = state
        .permissions
        .list(&patient_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve permissions", &e))?;
    Ok(envelope::success(
        StatusCode::OK,
        "Permissions retrieved",
        grants,
    ))
}
