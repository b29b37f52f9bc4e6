//! A full Health Bar stack for gateway tests.
//!
//! The five services run on ephemeral loopback listeners against one
//! in-memory database. The gateway router is driven in-process with a
//! synthetic peer address, so each test picks its own rate limit key.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use healthbar_core::blob::BlobStore;
use healthbar_core::credentials::PasswordHasher;
use healthbar_core::store::Database;
use healthbar_gateway::config::{BackendUrls, RateLimitSettings};
use healthbar_gateway::{GatewayConfig, GatewayState, build_router};
use healthbar_services::{ServiceKind, ServiceState, app};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const BOUNDARY: &str = "gateway-test-boundary";

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

pub struct Stack {
    pub gateway: GatewayState,
    pub uploads: TempDir,
    servers: Vec<JoinHandle<()>>,
}

impl Drop for Stack {
    fn drop(&mut self) {
        for server in &self.servers {
            server.abort();
        }
    }
}

/// An address with nothing listening.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Settings under which no token refills while a test runs.
pub fn fixed_budget(burst: u32) -> RateLimitSettings {
    RateLimitSettings {
        requests_per_second: 0.001,
        burst,
        ..RateLimitSettings::default()
    }
}

impl Stack {
    /// Starts every service except those in `down`, whose URLs point at
    /// closed ports.
    pub async fn start(down: &[ServiceKind], rate_limit: RateLimitSettings) -> Self {
        let uploads = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let blobs = BlobStore::new(uploads.path());
        blobs.ensure_root().await.unwrap();
        let state = ServiceState::new(
            &db,
            &SecretString::from("gateway-test-secret".to_string()),
            Duration::from_secs(3600),
            blobs,
        )
        .unwrap()
        .with_password_hasher(PasswordHasher::with_params(1024, 1, 1).unwrap());

        let mut servers = Vec::new();
        let mut urls = Vec::new();
        for kind in ServiceKind::ALL {
            if down.contains(&kind) {
                urls.push(closed_port().await);
                continue;
            }
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let router = app(kind, state.clone());
            servers.push(tokio::spawn(async move {
                axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await
                .unwrap();
            }));
            urls.push(format!("http://{addr}"));
        }

        let [auth, patient, doctor, timeline, prescription]: [String; 5] =
            urls.try_into().unwrap();
        let config = GatewayConfig {
            backends: BackendUrls {
                auth,
                patient,
                doctor,
                timeline,
                prescription,
            },
            rate_limit,
            upstream_timeout_secs: Some(10),
            ..GatewayConfig::default()
        };
        config.validate().unwrap();

        Self {
            gateway: GatewayState::new(config).unwrap(),
            uploads,
            servers,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.gateway.clone())
    }

    /// Sends `request` through the gateway as if it came from `peer`.
    pub async fn send_from(&self, peer: [u8; 4], mut request: Request<Body>) -> Reply {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 50000))));
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        Reply {
            status,
            headers,
            bytes,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        self.send_from([127, 0, 0, 1], request).await
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        self.send(json_request(method, uri, token, body)).await
    }

    /// Registers a user through the gateway and returns its token.
    pub async fn register(&self, email: &str, role: &str) -> String {
        let reply = self
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(serde_json::json!({"email": email, "password": "pw-123456", "role": role})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register {email}");
        reply.json()["data"]["token"].as_str().unwrap().to_string()
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
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
    builder.body(body).unwrap()
}

pub fn upload_request(token: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

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
