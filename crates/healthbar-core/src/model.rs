//! Domain model.
//!
//! All identifiers are opaque UUID strings generated at insert time. JSON
//! field names are part of the public API and must not change.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Account role. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns a patient profile and the records attached to it.
    Patient,
    /// Reads patient records through access grants.
    Doctor,
}

impl Role {
    /// Returns the wire representation of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Demographic data owned by a patient user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable patient profile fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientProfileInput {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: String,
    pub address: String,
}

/// Professional data owned by a doctor user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub specialization: String,
    pub license_number: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable doctor profile fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorProfileInput {
    pub full_name: String,
    pub specialization: String,
    pub license_number: String,
    pub phone: String,
}

/// A patient's grant of read access to a doctor.
///
/// At most one grant exists per (patient, doctor) pair. `revoked_at` is
/// present exactly when `is_active` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub granted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl AccessGrant {
    /// Returns true if `is_active` and `revoked_at` agree.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.is_active == self.revoked_at.is_none()
    }
}

/// A hospital visit on a patient's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalVisit {
    pub id: String,
    pub patient_id: String,
    pub hospital_name: String,
    pub visit_date: NaiveDate,
    pub reason: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable visit fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitInput {
    pub hospital_name: String,
    pub visit_date: NaiveDate,
    pub reason: String,
    pub notes: String,
}

/// Metadata for an uploaded prescription file.
///
/// `file_path` is the opaque blob store key, not a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: String,
    pub upload_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Metadata recorded for a freshly stored prescription file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrescription {
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: String,
}

/// Parses a `YYYY-MM-DD` calendar date.
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
