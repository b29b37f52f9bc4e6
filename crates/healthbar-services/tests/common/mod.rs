//! Shared harness for in-process service tests.
//!
//! All five routers share one in-memory database and one upload directory,
//! the way the real services share `DB_PATH` and `UPLOAD_PATH`.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use healthbar_core::blob::BlobStore;
use healthbar_core::credentials::PasswordHasher;
use healthbar_core::store::Database;
use healthbar_services::{ServiceKind, ServiceState, app};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";
pub const BOUNDARY: &str = "healthbar-test-boundary";

pub struct Harness {
    pub state: ServiceState,
    pub uploads: TempDir,
}

/// A registered user with a bearer token.
pub struct Account {
    pub user_id: String,
    pub token: String,
}

/// A fully parsed response.
pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("response body is JSON")
    }
}

impl Harness {
    pub async fn new() -> Self {
        let uploads = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let blobs = BlobStore::new(uploads.path());
        blobs.ensure_root().await.unwrap();
        let state = ServiceState::new(
            &db,
            &SecretString::from(SECRET.to_string()),
            Duration::from_secs(3600),
            blobs,
        )
        .unwrap()
        .with_password_hasher(PasswordHasher::with_params(1024, 1, 1).unwrap());
        Self { state, uploads }
    }

    pub fn router(&self, kind: ServiceKind) -> Router {
        app(kind, self.state.clone())
    }

    pub async fn send(&self, kind: ServiceKind, request: Request<Body>) -> Reply {
        let response = self.router(kind).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        Reply {
            status,
            headers,
            bytes,
        }
    }

    /// Sends a JSON request with an optional bearer token.
    pub async fn call(
        &self,
        kind: ServiceKind,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            },
            None => Body::empty(),
        };
        self.send(kind, builder.body(body).unwrap()).await
    }

    pub async fn register(&self, email: &str, role: &str) -> Account {
        let reply = self
            .call(
                ServiceKind::Auth,
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"email": email, "password": "pw-123456", "role": role})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register {email}");
        let body = reply.json();
        Account {
            user_id: body["data"]["user"]["id"].as_str().unwrap().to_string(),
            token: body["data"]["token"].as_str().unwrap().to_string(),
        }
    }

    /// Registers a patient with a profile; returns the account and profile id.
    pub async fn patient(&self, email: &str) -> (Account, String) {
        let account = self.register(email, "patient").await;
        let reply = self
            .call(
                ServiceKind::Patient,
                "POST",
                "/api/patients/profile",
                Some(&account.token),
                Some(json!({
                    "full_name": "Pat Example",
                    "date_of_birth": "1990-04-12",
                    "gender": "female",
                    "phone": "555-0100",
                    "address": "1 Main St"
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let id = reply.json()["data"]["id"].as_str().unwrap().to_string();
        (account, id)
    }

    /// Registers a doctor with a profile; returns the account and profile id.
    pub async fn doctor(&self, email: &str) -> (Account, String) {
        let account = self.register(email, "doctor").await;
        let reply = self
            .call(
                ServiceKind::Doctor,
                "POST",
                "/api/doctors/profile",
                Some(&account.token),
                Some(json!({
                    "full_name": "Dr Example",
                    "specialization": "cardiology",
                    "license_number": "LIC-1",
                    "phone": "555-0199"
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let id = reply.json()["data"]["id"].as_str().unwrap().to_string();
        (account, id)
    }

    pub async fn grant(&self, patient: &Account, doctor_id: &str) {
        let reply = self
            .call(
                ServiceKind::Patient,
                "POST",
                "/api/patients/permissions/grant",
                Some(&patient.token),
                Some(json!({"doctor_id": doctor_id})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    pub async fn revoke(&self, patient: &Account, doctor_id: &str) {
        let reply = self
            .call(
                ServiceKind::Patient,
                "DELETE",
                &format!("/api/patients/permissions/revoke?doctor_id={doctor_id}"),
                Some(&patient.token),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    /// Number of entries in the upload directory.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).unwrap().count()
    }
}

/// Builds a single-file multipart body.
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/prescriptions/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Asserts the envelope invariant: `success` agrees with the status class.
pub fn assert_envelope(reply: &Reply) {
    let body = reply.json();
    let success = body["success"].as_bool().expect("success flag");
    assert_eq!(success, reply.status.is_success(), "body: {body}");
    if !success {
        assert!(body["error"].is_string(), "body: {body}");
    }
}
