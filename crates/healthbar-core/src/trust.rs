//! Identity propagation for protected routes.
//!
//! [`require_auth`] is the single place a bearer token is turned into an
//! identity. It runs as a `route_layer` on every protected route of every
//! service and:
//!
//! 1. removes any client-supplied `X-User-ID`, `X-User-Email` and
//!    `X-User-Role` headers,
//! 2. requires `Authorization: Bearer <token>` and verifies it,
//! 3. stores an [`AuthContext`] in the request extensions and rewrites the
//!    three identity headers from the verified claims.
//!
//! Handlers take [`AuthContext`] as an extractor. The extractor fails with
//! 401 when no context is present, so a route mounted without the layer
//! rejects every request instead of trusting headers.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::credentials::{CredentialError, TokenVerifier};
use crate::error::ApiError;
use crate::model::Role;

/// Header carrying the authenticated user id.
pub const HEADER_USER_ID: &str = "x-user-id";
/// Header carrying the authenticated user's email.
pub const HEADER_USER_EMAIL: &str = "x-user-email";
/// Header carrying the authenticated user's role.
pub const HEADER_USER_ROLE: &str = "x-user-role";

const BEARER_PREFIX: &str = "Bearer ";

/// The verified identity of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl AuthContext {
    /// Fails with 403 `message` unless the caller has `role`.
    pub fn require_role(&self, role: Role, message: &str) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::forbidden(message))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))
    }
}

/// Authenticates the request or answers 401.
pub async fn require_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers_mut();
    headers.remove(HEADER_USER_ID);
    headers.remove(HEADER_USER_EMAIL);
    headers.remove(HEADER_USER_ROLE);

    let Some(authorization) = headers.get(AUTHORIZATION) else {
        return unauthorized("Authorization header required");
    };
    let Some(token) = authorization
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
    else {
        return unauthorized("Invalid authorization header format");
    };

    let claims = match verifier.verify(token.trim()) {
        Ok(claims) => claims,
        Err(CredentialError::Expired) => return unauthorized("Token expired"),
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            return unauthorized("Invalid token");
        },
    };

    let (Ok(user_id), Ok(email)) = (
        HeaderValue::from_str(&claims.user_id),
        HeaderValue::from_str(&claims.email),
    ) else {
        return unauthorized("Invalid token");
    };
    headers.insert(HEADER_USER_ID, user_id);
    headers.insert(HEADER_USER_EMAIL, email);
    headers.insert(
        HEADER_USER_ROLE,
        HeaderValue::from_static(claims.role.as_str()),
    );

    request.extensions_mut().insert(AuthContext {
        user_id: claims.user_id,
        email: claims.email,
        role: claims.role,
    });
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    ApiError::Unauthorized(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use axum::middleware;
    use axum::routing::get;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::credentials::TokenIssuer;
    use crate::model::User;

    const SECRET: &str = "trust-test-secret";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            &SecretString::from(SECRET.to_string()),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    fn token_for(role: Role) -> String {
        let now = Utc::now();
        issuer()
            .issue(&User {
                id: "user-42".into(),
                email: "p@x.io".into(),
                password_hash: String::new(),
                role,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    async fn echo(ctx: AuthContext, headers: HeaderMap) -> String {
        format!(
            "{}|{}|{}|{}",
            ctx.user_id,
            ctx.role,
            headers
                .get(HEADER_USER_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            headers
                .get_all(HEADER_USER_ROLE)
                .iter()
                .count()
        )
    }

    fn app() -> Router {
        let verifier =
            Arc::new(TokenVerifier::new(&SecretString::from(SECRET.to_string())).unwrap());
        Router::new()
            .route("/protected", get(echo))
            .route_layer(middleware::from_fn_with_state(verifier, require_auth))
            .route("/unlayered", get(echo))
    }

    async fn send(app: Router, request: Request) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_valid_token_projects_identity() {
        let request = axum::http::Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, format!("Bearer {}", token_for(Role::Doctor)))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-42|doctor|user-42|1");
    }

    #[tokio::test]
    async fn test_spoofed_identity_headers_are_replaced() {
        let request = axum::http::Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, format!("Bearer {}", token_for(Role::Patient)))
            .header(HEADER_USER_ID, "victim")
            .header(HEADER_USER_ROLE, "doctor")
            .header(HEADER_USER_ROLE, "admin")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-42|patient|user-42|1");
    }

    #[tokio::test]
    async fn test_missing_authorization_is_unauthorized() {
        let request = axum::http::Request::builder()
            .uri("/protected")
            .header(HEADER_USER_ID, "victim")
            .header(HEADER_USER_ROLE, "patient")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Authorization header required");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_unauthorized() {
        let request = axum::http::Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tampered_token_is_unauthorized() {
        let mut token = token_for(Role::Patient);
        token.push('x');
        let request = axum::http::Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid token"));
    }

    #[tokio::test]
    async fn test_route_without_layer_fails_closed() {
        let request = axum::http::Request::builder()
            .uri("/unlayered")
            .header(HEADER_USER_ID, "victim")
            .header(HEADER_USER_EMAIL, "v@x.io")
            .header(HEADER_USER_ROLE, "patient")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_role() {
        let ctx = AuthContext {
            user_id: "u".into(),
            email: "e".into(),
            role: Role::Doctor,
        };
        assert!(ctx.require_role(Role::Doctor, "Only doctors").is_ok());
        assert_eq!(
            ctx.require_role(Role::Patient, "Only patients can do this"),
            Err(ApiError::forbidden("Only patients can do this"))
        );
    }
}
