//! Registration, login and identity echo.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use healthbar_core::envelope;
use healthbar_core::error::ApiError;
use healthbar_core::extract::JsonBody;
use healthbar_core::model::{Role, User};
use healthbar_core::store::StoreError;
use healthbar_core::trust::AuthContext;
use serde::{Deserialize, Serialize};

use crate::ServiceState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterRequest {
    email: String,
    password: String,
    role: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user: User,
}

pub fn router(state: ServiceState) -> Router {
    let protected = Router::new().route("/api/auth/me", get(me));
    crate::protect(protected, &state)
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .with_state(state)
}

async fn register(
    State(state): State<ServiceState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<Response, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    let role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::bad_request("Role must be 'patient' or 'doctor'"))?;

    if state.users.find_by_email(req.email.clone()).await?.is_some() {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let hasher = state.hasher.clone();
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::internal("Failed to hash password", &e))?
        .map_err(|e| ApiError::internal("Failed to hash password", &e))?;

    let user = match state.users.create(req.email, password_hash, role).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            return Err(ApiError::Conflict("Email already exists".to_string()));
        },
        Err(e) => return Err(ApiError::internal("Failed to create user", &e)),
    };

    let token = state
        .issuer
        .issue(&user)
        .map_err(|e| ApiError::internal("Failed to generate token", &e))?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(envelope::success(
        StatusCode::CREATED,
        "User registered successfully",
        AuthResponse { token, user },
    ))
}

async fn login(
    State(state): State<ServiceState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .users
        .find_by_email(req.email)
        .await?
        .ok_or_else(invalid)?;

    let hasher = state.hasher.clone();
    let password = req.password;
    let stored = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
        .await
        .map_err(|e| ApiError::internal("Failed to verify password", &e))?;
    if !matches {
        return Err(invalid());
    }

    let token = state
        .issuer
        .issue(&user)
        .map_err(|e| ApiError::internal("Failed to generate token", &e))?;

    Ok(envelope::success(
        StatusCode::OK,
        "Login successful",
        AuthResponse { token, user },
    ))
}

async fn me(State(state): State<ServiceState>, ctx: AuthContext) -> Result<Response, ApiError> {
    let user = state
        .users
        .find_by_id(ctx.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(envelope::success(StatusCode::OK, "User retrieved", user))
}
