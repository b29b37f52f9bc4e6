//! Patient and doctor profiles.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Database, StoreError, new_id};
use crate::model::{DoctorProfile, DoctorProfileInput, PatientProfile, PatientProfileInput};

const PATIENT_COLUMNS: &str = "id, user_id, full_name, date_of_birth, gender, phone, address, \
                               created_at, updated_at";

const DOCTOR_COLUMNS: &str = "id, user_id, full_name, specialization, license_number, phone, \
                              created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientProfile> {
    Ok(PatientProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        full_name: row.get(2)?,
        date_of_birth: row.get(3)?,
        gender: row.get(4)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<DoctorProfile> {
    Ok(DoctorProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        full_name: row.get(2)?,
        specialization: row.get(3)?,
        license_number: row.get(4)?,
        phone: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn patient_where(
    conn: &Connection,
    column: &str,
    key: &str,
) -> rusqlite::Result<Option<PatientProfile>> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patient_profiles WHERE {column} = ?1"),
        params![key],
        patient_from_row,
    )
    .optional()
}

fn doctor_where(
    conn: &Connection,
    column: &str,
    key: &str,
) -> rusqlite::Result<Option<DoctorProfile>> {
    conn.query_row(
        &format!("SELECT {DOCTOR_COLUMNS} FROM doctor_profiles WHERE {column} = ?1"),
        params![key],
        doctor_from_row,
    )
    .optional()
}

/// Patient profile storage. One profile per patient user.
#[derive(Debug, Clone)]
pub struct PatientRepository {
    db: Database,
}

impl PatientRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the profile for `user_id`.
    ///
    /// Fails with [`StoreError::Conflict`] if the user already has one.
    pub async fn create(
        &self,
        user_id: String,
        input: PatientProfileInput,
    ) -> Result<PatientProfile, StoreError> {
        self.db
            .call(move |conn| {
                let now = Utc::now();
                let profile = PatientProfile {
                    id: new_id(),
                    user_id,
                    full_name: input.full_name,
                    date_of_birth: input.date_of_birth,
                    gender: input.gender,
                    phone: input.phone,
                    address: input.address,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO patient_profiles
                         (id, user_id, full_name, date_of_birth, gender, phone, address,
                          created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        profile.id,
                        profile.user_id,
                        profile.full_name,
                        profile.date_of_birth,
                        profile.gender,
                        profile.phone,
                        profile.address,
                        profile.created_at,
                        profile.updated_at
                    ],
                )?;
                Ok(profile)
            })
            .await
    }

    pub async fn get_by_user(&self, user_id: String) -> Result<Option<PatientProfile>, StoreError> {
        self.db
            .call(move |conn| Ok(patient_where(conn, "user_id", &user_id)?))
            .await
    }

    pub async fn get_by_id(&self, id: String) -> Result<Option<PatientProfile>, StoreError> {
        self.db
            .call(move |conn| Ok(patient_where(conn, "id", &id)?))
            .await
    }

    /// Returns the profile id owned by `user_id`, if any.
    pub async fn profile_id_for_user(&self, user_id: String) -> Result<Option<String>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id FROM patient_profiles WHERE user_id = ?1",
                        params![user_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn exists(&self, id: String) -> Result<bool, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM patient_profiles WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?)
            })
            .await
    }

    /// Replaces the editable fields of `user_id`'s profile.
    ///
    /// Returns `None` if the user has no profile.
    pub async fn update(
        &self,
        user_id: String,
        input: PatientProfileInput,
    ) -> Result<Option<PatientProfile>, StoreError> {
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE patient_profiles
                     SET full_name = ?1, date_of_birth = ?2, gender = ?3, phone = ?4,
                         address = ?5, updated_at = ?6
                     WHERE user_id = ?7",
                    params![
                        input.full_name,
                        input.date_of_birth,
                        input.gender,
                        input.phone,
                        input.address,
                        Utc::now(),
                        user_id
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(patient_where(conn, "user_id", &user_id)?)
            })
            .await
    }
}

/// Doctor profile storage. One profile per doctor user.
#[derive(Debug, Clone)]
pub struct DoctorRepository {
    db: Database,
}

impl DoctorRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the profile for `user_id`.
    ///
    /// Fails with [`StoreError::Conflict`] if the user already has one.
    pub async fn create(
        &self,
        user_id: String,
        input: DoctorProfileInput,
    ) -> Result<DoctorProfile, StoreError> {
        self.db
            .call(move |conn| {
                let now = Utc::now();
                let profile = DoctorProfile {
                    id: new_id(),
                    user_id,
                    full_name: input.full_name,
                    specialization: input.specialization,
                    license_number: input.license_number,
                    phone: input.phone,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO doctor_profiles
                         (id, user_id, full_name, specialization, license_number, phone,
                          created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        profile.id,
                        profile.user_id,
                        profile.full_name,
                        profile.specialization,
                        profile.license_number,
                        profile.phone,
                        profile.created_at,
                        profile.updated_at
                    ],
                )?;
                Ok(profile)
            })
            .await
    }

    pub async fn get_by_user(&self, user_id: String) -> Result<Option<DoctorProfile>, StoreError> {
        self.db
            .call(move |conn| Ok(doctor_where(conn, "user_id", &user_id)?))
            .await
    }

    pub async fn get_by_id(&self, id: String) -> Result<Option<DoctorProfile>, StoreError> {
        self.db
            .call(move |conn| Ok(doctor_where(conn, "id", &id)?))
            .await
    }

    /// Returns the profile id owned by `user_id`, if any.
    pub async fn profile_id_for_user(&self, user_id: String) -> Result<Option<String>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id FROM doctor_profiles WHERE user_id = ?1",
                        params![user_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    /// Replaces the editable fields of `user_id`'s profile.
    ///
    /// Returns `None` if the user has no profile.
    pub async fn update(
        &self,
        user_id: String,
        input: DoctorProfileInput,
    ) -> Result<Option<DoctorProfile>, StoreError> {
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE doctor_profiles
                     SET full_name = ?1, specialization = ?2, license_number = ?3, phone = ?4,
                         updated_at = ?5
                     WHERE user_id = ?6",
                    params![
                        input.full_name,
                        input.specialization,
                        input.license_number,
                        input.phone,
                        Utc::now(),
                        user_id
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(doctor_where(conn, "user_id", &user_id)?)
            })
            .await
    }

    /// Patient profiles that currently grant `doctor_id` access, by name.
    pub async fn accessible_patients(
        &self,
        doctor_id: String,
    ) -> Result<Vec<PatientProfile>, StoreError> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.user_id, p.full_name, p.date_of_birth, p.gender, p.phone,
                            p.address, p.created_at, p.updated_at
                     FROM patient_profiles p
                     JOIN doctor_access_permissions dap ON dap.patient_id = p.id
                     WHERE dap.doctor_id = ?1 AND dap.is_active = 1
                     ORDER BY p.full_name",
                )?;
                let rows = stmt.query_map(params![doctor_id], patient_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }
}
