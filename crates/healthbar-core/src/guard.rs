//! Access-check guard.
//!
//! Decides whether an authenticated caller may touch a patient's records.
//!
//! | Caller  | Target            | Read                   | Write |
//! |---------|-------------------|------------------------|-------|
//! | patient | own profile       | allow                  | allow |
//! | patient | other profile     | deny                   | deny  |
//! | doctor  | any profile       | allow iff active grant | deny  |
//!
//! Denials never reveal whether the target exists: both
//! [`AccessDecision::Deny`] and [`AccessDecision::NotFound`] surface as
//! 403 "Access denied".

use crate::error::ApiError;
use crate::model::Role;
use crate::permissions::{PermissionStore, SqlitePermissionStore};
use crate::store::{DoctorRepository, PatientRepository, StoreError};
use crate::trust::AuthContext;

/// What the caller wants to do with the target's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
    /// The target patient profile does not exist.
    NotFound,
}

impl AccessDecision {
    /// Maps the decision to a handler result. Every non-allow is a 403.
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny | Self::NotFound => Err(ApiError::access_denied()),
        }
    }
}

/// An authenticated caller with their own profile resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Patient {
        user_id: String,
        profile_id: Option<String>,
    },
    Doctor {
        user_id: String,
        profile_id: Option<String>,
    },
}

impl Caller {
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Patient { .. } => Role::Patient,
            Self::Doctor { .. } => Role::Doctor,
        }
    }

    /// The caller's own profile id, if they created one.
    #[must_use]
    pub fn profile_id(&self) -> Option<&str> {
        match self {
            Self::Patient { profile_id, .. } | Self::Doctor { profile_id, .. } => {
                profile_id.as_deref()
            },
        }
    }
}

/// Resolves callers and decides access.
#[derive(Debug, Clone)]
pub struct AccessGuard<P = SqlitePermissionStore> {
    patients: PatientRepository,
    doctors: DoctorRepository,
    permissions: P,
}

impl<P: PermissionStore> AccessGuard<P> {
    #[must_use]
    pub const fn new(patients: PatientRepository, doctors: DoctorRepository, permissions: P) -> Self {
        Self {
            patients,
            doctors,
            permissions,
        }
    }

    /// Looks up the caller's own profile.
    pub async fn resolve(&self, ctx: &AuthContext) -> Result<Caller, StoreError> {
        Ok(match ctx.role {
            Role::Patient => Caller::Patient {
                user_id: ctx.user_id.clone(),
                profile_id: self.patients.profile_id_for_user(ctx.user_id.clone()).await?,
            },
            Role::Doctor => Caller::Doctor {
                user_id: ctx.user_id.clone(),
                profile_id: self.doctors.profile_id_for_user(ctx.user_id.clone()).await?,
            },
        })
    }

    /// Decides whether `caller` may access `target_patient_id` in `mode`.
    pub async fn authorize(
        &self,
        caller: &Caller,
        target_patient_id: &str,
        mode: AccessMode,
    ) -> Result<AccessDecision, StoreError> {
        let allowed = match caller {
            Caller::Patient { profile_id, .. } => {
                profile_id.as_deref() == Some(target_patient_id)
            },
            Caller::Doctor { profile_id, .. } => match (mode, profile_id) {
                (AccessMode::Read, Some(doctor_id)) => {
                    self.permissions
                        .is_active(target_patient_id, doctor_id)
                        .await?
                },
                _ => false,
            },
        };
        if allowed {
            return Ok(AccessDecision::Allow);
        }
        if self.patients.exists(target_patient_id.to_string()).await? {
            Ok(AccessDecision::Deny)
        } else {
            Ok(AccessDecision::NotFound)
        }
    }

    /// Resolves the caller and checks access in one step.
    pub async fn check(
        &self,
        ctx: &AuthContext,
        target_patient_id: &str,
        mode: AccessMode,
    ) -> Result<Caller, ApiError> {
        let caller = self.resolve(ctx).await?;
        let decision = self.authorize(&caller, target_patient_id, mode).await?;
        if decision != AccessDecision::Allow {
            tracing::info!(
                user_id = %ctx.user_id,
                role = %ctx.role,
                target = %target_patient_id,
                ?mode,
                ?decision,
                "access denied"
            );
        }
        decision.into_result()?;
        Ok(caller)
    }
}
