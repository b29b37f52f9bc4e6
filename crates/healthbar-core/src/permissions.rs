//! Doctor access grants.
//!
//! A patient grants a doctor read access to their records; the grant can be
//! revoked and granted again. There is at most one grant row per
//! (patient, doctor) pair, so re-granting reactivates the existing row
//! instead of inserting a new one.
//!
//! # Semantics
//!
//! - `grant` is an upsert. Granting twice leaves one active row; only
//!   `granted_at` moves forward.
//! - `revoke` deactivates an active grant. Revoking an inactive or missing
//!   grant succeeds and changes nothing.
//! - `is_active` is what the access guard consults on every cross-patient
//!   read.

use std::future::Future;

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use crate::model::AccessGrant;
use crate::store::{Database, StoreError, new_id};

/// Storage for access grants.
pub trait PermissionStore: Send + Sync {
    /// Grants `doctor_id` read access to `patient_id`'s records.
    ///
    /// Fails with [`StoreError::NotFound`] if the doctor profile does not
    /// exist.
    fn grant(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> impl Future<Output = Result<AccessGrant, StoreError>> + Send;

    /// Revokes the grant, if active.
    fn revoke(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns true if an active grant exists for the pair.
    fn is_active(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Lists every grant `patient_id` has ever issued, newest first.
    fn list(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<Vec<AccessGrant>, StoreError>> + Send;
}

const GRANT_COLUMNS: &str = "id, patient_id, doctor_id, granted_at, revoked_at, is_active";

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    Ok(AccessGrant {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        granted_at: row.get(3)?,
        revoked_at: row.get(4)?,
        is_active: row.get(5)?,
    })
}

/// [`PermissionStore`] over the shared `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    db: Database,
}

impl SqlitePermissionStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

impl PermissionStore for SqlitePermissionStore {
    async fn grant(&self, patient_id: &str, doctor_id: &str) -> Result<AccessGrant, StoreError> {
        let patient_id = patient_id.to_string();
        let doctor_id = doctor_id.to_string();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let doctor_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM doctor_profiles WHERE id = ?1)",
                    params![doctor_id],
                    |row| row.get(0),
                )?;
                if !doctor_exists {
                    return Err(StoreError::NotFound);
                }
                tx.execute(
                    "INSERT INTO doctor_access_permissions
                         (id, patient_id, doctor_id, granted_at, revoked_at, is_active)
                     VALUES (?1, ?2, ?3, ?4, NULL, 1)
                     ON CONFLICT (patient_id, doctor_id) DO UPDATE SET
                         is_active = 1,
                         revoked_at = NULL,
                         granted_at = excluded.granted_at",
                    params![
                        new_id(),
                        patient_id,
                        doctor_id,
                        Utc::now()
                    ],
                )?;
                let grant = tx.query_row(
                    &format!(
                        "SELECT {GRANT_COLUMNS} FROM doctor_access_permissions
                         WHERE patient_id = ?1 AND doctor_id = ?2"
                    ),
                    params![patient_id, doctor_id],
                    grant_from_row,
                )?;
                tx.commit()?;
                Ok(grant)
            })
            .await
    }

    async fn revoke(&self, patient_id: &str, doctor_id: &str) -> Result<(), StoreError> {
        let patient_id = patient_id.to_string();
        let doctor_id = doctor_id.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE doctor_access_permissions
                     SET is_active = 0, revoked_at = ?3
                     WHERE patient_id = ?1 AND doctor_id = ?2 AND is_active = 1",
                    params![patient_id, doctor_id, Utc::now()],
                )?;
                Ok(())
            })
            .await
    }

    async fn is_active(&self, patient_id: &str, doctor_id: &str) -> Result<bool, StoreError> {
        let patient_id = patient_id.to_string();
        let doctor_id = doctor_id.to_string();
        self.db
            .call(move |conn| {
                let active = conn
                    .query_row(
                        "SELECT is_active FROM doctor_access_permissions
                         WHERE patient_id = ?1 AND doctor_id = ?2",
                        params![patient_id, doctor_id],
                        |row| row.get::<_, bool>(0),
                    )
                    .optional()?;
                Ok(active.unwrap_or(false))
            })
            .await
    }

    async fn list(&self, patient_id: &str) -> Result<Vec<AccessGrant>, StoreError> {
        let patient_id = patient_id.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {GRANT_COLUMNS} FROM doctor_access_permissions
                     WHERE patient_id = ?1
                     ORDER BY granted_at DESC"
                ))?;
                let rows = stmt.query_map(params![patient_id], grant_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }
}
