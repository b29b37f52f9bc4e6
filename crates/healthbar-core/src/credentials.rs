//! Bearer tokens and password hashing.
//!
//! # Tokens
//!
//! Tokens are HS256 JWTs signed with a single shared secret. The payload
//! carries the subject's identity and role so the identity propagator can
//! authenticate a request without touching the database:
//!
//! ```json
//! {"user_id": "...", "email": "...", "role": "patient", "iat": 0, "exp": 0}
//! ```
//!
//! Verification checks the signature and expiry with no leeway. A token
//! whose role is not `patient` or `doctor` fails to decode and is rejected.
//!
//! # Passwords
//!
//! Passwords are hashed with Argon2id into PHC strings. Verification reads
//! the parameters from the stored string, so changing the hashing cost does
//! not invalidate existing accounts.

use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Argon2, Params};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Role, User};

/// Errors from token and password operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The signing secret is empty.
    #[error("token signing secret must not be empty")]
    EmptySecret,

    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// Bad signature, malformed token or unexpected claims.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token encoding failed.
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Password hashing failed or the hashing parameters are invalid.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Identity carried inside a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Signs bearer tokens. Held by the auth service only.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    /// Creates an issuer for `secret` producing tokens valid for `ttl`.
    pub fn new(secret: &SecretString, ttl: Duration) -> Result<Self, CredentialError> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Issues a token for `user`, valid from now.
    pub fn issue(&self, user: &User) -> Result<String, CredentialError> {
        self.issue_at(user, Utc::now())
    }

    /// Issues a token for `user` as if it were `now`.
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let iat = now.timestamp();
        let claims = Claims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat,
            exp: iat.saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }
}

/// Verifies bearer tokens. Held by every service behind the gateway.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for `secret`.
    pub fn new(secret: &SecretString) -> Result<Self, CredentialError> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Checks the signature and expiry and returns the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::InvalidToken(e.to_string()),
            })
    }
}

/// Argon2id password hashing. `Default` uses the recommended cost.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Uses explicit Argon2 cost parameters (memory in KiB, iterations,
    /// lanes).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, CredentialError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hashes `password` with a fresh random salt into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Returns true if `password` matches the stored PHC string.
    ///
    /// A malformed stored hash never matches.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
