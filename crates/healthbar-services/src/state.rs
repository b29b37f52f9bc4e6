//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use healthbar_core::blob::BlobStore;
use healthbar_core::credentials::{CredentialError, PasswordHasher, TokenIssuer, TokenVerifier};
use healthbar_core::error::ApiError;
use healthbar_core::guard::AccessGuard;
use healthbar_core::permissions::SqlitePermissionStore;
use healthbar_core::store::{
    Database, DoctorRepository, PatientRepository, PrescriptionRepository, TimelineRepository,
    UserRepository,
};
use healthbar_core::trust::AuthContext;
use secrecy::SecretString;

/// Everything a handler may need. Cheap to clone.
#[derive(Clone)]
pub struct ServiceState {
    pub users: UserRepository,
    pub patients: PatientRepository,
    pub doctors: DoctorRepository,
    pub timeline: TimelineRepository,
    pub prescriptions: PrescriptionRepository,
    pub permissions: SqlitePermissionStore,
    pub guard: AccessGuard,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<TokenVerifier>,
    pub hasher: PasswordHasher,
    pub blobs: BlobStore,
}

impl ServiceState {
    /// Builds the state over `db`, signing tokens with `secret`.
    pub fn new(
        db: &Database,
        secret: &SecretString,
        token_ttl: Duration,
        blobs: BlobStore,
    ) -> Result<Self, CredentialError> {
        let patients = PatientRepository::new(db.clone());
        let doctors = DoctorRepository::new(db.clone());
        let permissions = SqlitePermissionStore::new(db.clone());
        Ok(Self {
            users: UserRepository::new(db.clone()),
            guard: AccessGuard::new(patients.clone(), doctors.clone(), permissions.clone()),
            patients,
            doctors,
            timeline: TimelineRepository::new(db.clone()),
            prescriptions: PrescriptionRepository::new(db.clone()),
            permissions,
            issuer: Arc::new(TokenIssuer::new(secret, token_ttl)?),
            verifier: Arc::new(TokenVerifier::new(secret)?),
            hasher: PasswordHasher::default(),
            blobs,
        })
    }

    /// Replaces the password hashing cost.
    #[must_use]
    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// The caller's own patient profile id, or 404.
    pub async fn own_patient_profile(&self, ctx: &AuthContext) -> Result<String, ApiError> {
        self.patients
            .profile_id_for_user(ctx.user_id.clone())
            .await?
            .ok_or_else(|| ApiError::not_found("Patient profile not found"))
    }

    /// The caller's own doctor profile id, or 404.
    pub async fn own_doctor_profile(&self, ctx: &AuthContext) -> Result<String, ApiError> {
        self.doctors
            .profile_id_for_user(ctx.user_id.clone())
            .await?
            .ok_or_else(|| ApiError::not_found("Doctor profile not found"))
    }
}
