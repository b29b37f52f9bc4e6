//! Prescription uploads and downloads.
//!
//! Metadata lives in the `prescriptions` table; file bytes live in the
//! [`BlobStore`](healthbar_core::blob::BlobStore). An upload is buffered in
//! memory up to [`MAX_UPLOAD_BYTES`] and only then written, so a rejected
//! upload leaves neither a row nor a file behind.

use axum::Router;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use healthbar_core::blob::{BlobError, MAX_UPLOAD_BYTES, allowed_extension, content_type_for};
use healthbar_core::envelope;
use healthbar_core::error::ApiError;
use healthbar_core::extract::QueryParams;
use healthbar_core::guard::AccessMode;
use healthbar_core::model::{NewPrescription, Prescription, Role};
use healthbar_core::trust::AuthContext;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::ServiceState;

/// Slack above the file limit for multipart framing and other fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatientQuery {
    patient_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdQuery {
    id: String,
}

pub fn router(state: ServiceState) -> Router {
    let routes = Router::new()
        .route(
            "/api/prescriptions/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/api/prescriptions/my", get(my_prescriptions))
        .route("/api/prescriptions/patient", get(patient_prescriptions))
        .route("/api/prescriptions/download", get(download))
        .route("/api/prescriptions", delete(delete_prescription));
    crate::protect(routes, &state).with_state(state)
}

fn too_large() -> ApiError {
    ApiError::PayloadRejected("File too large. Max size is 10MB".to_string())
}

/// A validated upload held in memory.
struct Upload {
    file_name: String,
    ext: String,
    bytes: Vec<u8>,
}

/// Pulls the `file` field out of the form, enforcing type and size.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let no_file = || ApiError::bad_request("No file uploaded");

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            no_file()
        }
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(no_file());
        }
        let ext = allowed_extension(&file_name).ok_or_else(|| {
            ApiError::PayloadRejected(
                "Invalid file type. Only PDF, JPG, JPEG, and PNG are allowed".to_string(),
            )
        })?;

        let mut bytes = Vec::new();
        loop {
            let chunk = field.chunk().await.map_err(|e| {
                if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    too_large()
                } else {
                    ApiError::bad_request("Failed to read upload")
                }
            })?;
            let Some(chunk) = chunk else { break };
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(Upload {
            file_name,
            ext,
            bytes,
        });
    }
    Err(no_file())
}

async fn upload(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can upload prescriptions")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    state
        .guard
        .check(&ctx, &patient_id, AccessMode::Write)
        .await?;

    let multipart = multipart.map_err(|_| ApiError::bad_request("No file uploaded"))?;
    let upload = read_upload(multipart).await?;
    let file_size = i64::try_from(upload.bytes.len()).map_err(|_| too_large())?;

    let key = state
        .blobs
        .store(&patient_id, &upload.ext, &upload.bytes)
        .await
        .map_err(|e| ApiError::internal("Failed to save file", &e))?;

    let record = NewPrescription {
        file_name: upload.file_name,
        file_type: upload.ext,
        file_size,
        file_path: key.clone(),
    };
    let prescription = match state.prescriptions.create(patient_id, record).await {
        Ok(prescription) => prescription,
        Err(e) => {
            if let Err(cleanup) = state.blobs.remove(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "failed to remove orphaned blob");
            }
            return Err(ApiError::internal("Failed to save prescription record", &e));
        },
    };

    tracing::info!(
        prescription_id = %prescription.id,
        size = prescription.file_size,
        "prescription uploaded"
    );
    Ok(envelope::success(
        StatusCode::CREATED,
        "Prescription uploaded successfully",
        prescription,
    ))
}

async fn my_prescriptions(
    State(state): State<ServiceState>,
    ctx: AuthContext,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can view their prescriptions")?;
    let patient_id = state.own_patient_profile(&ctx).await?;
    prescriptions_for(&state, &ctx, patient_id).await
}

async fn patient_prescriptions(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<PatientQuery>,
) -> Result<Response, ApiError> {
    if query.patient_id.is_empty() {
        return Err(ApiError::bad_request("Patient ID is required"));
    }
    prescriptions_for(&state, &ctx, query.patient_id).await
}

async fn prescriptions_for(
    state: &ServiceState,
    ctx: &AuthContext,
    patient_id: String,
) -> Result<Response, ApiError> {
    state
        .guard
        .check(ctx, &patient_id, AccessMode::Read)
        .await?;
    let prescriptions = state
        .prescriptions
        .list_for_patient(patient_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve prescriptions", &e))?;
    Ok(envelope::success(
        StatusCode::OK,
        "Prescriptions retrieved",
        prescriptions,
    ))
}

async fn authorized_prescription(
    state: &ServiceState,
    ctx: &AuthContext,
    id: String,
    mode: AccessMode,
) -> Result<Prescription, ApiError> {
    if id.is_empty() {
        return Err(ApiError::bad_request("Prescription ID is required"));
    }
    let prescription = state
        .prescriptions
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prescription not found"))?;
    state
        .guard
        .check(ctx, &prescription.patient_id, mode)
        .await?;
    Ok(prescription)
}

fn attachment_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn download(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<IdQuery>,
) -> Result<Response, ApiError> {
    let prescription = authorized_prescription(&state, &ctx, query.id, AccessMode::Read).await?;

    let file = match state.blobs.open(&prescription.file_path).await {
        Ok(file) => file,
        Err(BlobError::NotFound(_)) => return Err(ApiError::not_found("File not found")),
        Err(e) => return Err(ApiError::internal("Failed to open file", &e)),
    };

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(&prescription.file_type)),
        ),
        (
            header::CONTENT_DISPOSITION,
            attachment_disposition(&prescription.file_name),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

async fn delete_prescription(
    State(state): State<ServiceState>,
    ctx: AuthContext,
    QueryParams(query): QueryParams<IdQuery>,
) -> Result<Response, ApiError> {
    ctx.require_role(Role::Patient, "Only patients can delete prescriptions")?;
    let prescription = authorized_prescription(&state, &ctx, query.id, AccessMode::Write).await?;

    let deleted = state
        .prescriptions
        .delete(prescription.id.clone())
        .await
        .map_err(|e| ApiError::internal("Failed to delete prescription", &e))?;
    if !deleted {
        return Err(ApiError::not_found("Prescription not found"));
    }
    if let Err(e) = state.blobs.remove(&prescription.file_path).await {
        tracing::warn!(
            prescription_id = %prescription.id,
            error = %e,
            "failed to remove prescription file"
        );
    }
    Ok(envelope::message(
        StatusCode::OK,
        "Prescription deleted successfully",
    ))
}
