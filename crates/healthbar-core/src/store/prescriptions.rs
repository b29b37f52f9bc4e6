//! Prescription metadata. File contents live in the blob store.

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::{Database, StoreError, new_id};
use crate::model::{NewPrescription, Prescription};

const PRESCRIPTION_COLUMNS: &str =
    "id, patient_id, file_name, file_type, file_size, file_path, upload_date, created_at";

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        file_name: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        file_path: row.get(5)?,
        upload_date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[derive(Debug, Clone)]
pub struct PrescriptionRepository {
    db: Database,
}

impl PrescriptionRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records an uploaded file. Fails with [`StoreError::Conflict`] if the
    /// storage key is already referenced.
    pub async fn create(
        &self,
        patient_id: String,
        new: NewPrescription,
    ) -> Result<Prescription, StoreError> {
        self.db
            .call(move |conn| {
                let now = Utc::now();
                let prescription = Prescription {
                    id: new_id(),
                    patient_id,
                    file_name: new.file_name,
                    file_type: new.file_type,
                    file_size: new.file_size,
                    file_path: new.file_path,
                    upload_date: now,
                    created_at: now,
                };
                conn.execute(
                    "INSERT INTO prescriptions
                         (id, patient_id, file_name, file_type, file_size, file_path,
                          upload_date, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        prescription.id,
                        prescription.patient_id,
                        prescription.file_name,
                        prescription.file_type,
                        prescription.file_size,
                        prescription.file_path,
                        prescription.upload_date,
                        prescription.created_at
                    ],
                )?;
                Ok(prescription)
            })
            .await
    }

    pub async fn get(&self, id: String) -> Result<Option<Prescription>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
                        params![id],
                        prescription_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Lists `patient_id`'s prescriptions, newest upload first.
    pub async fn list_for_patient(
        &self,
        patient_id: String,
    ) -> Result<Vec<Prescription>, StoreError> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
                     WHERE patient_id = ?1
                     ORDER BY upload_date DESC"
                ))?;
                let rows = stmt.query_map(params![patient_id], prescription_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// Deletes the row. Returns false if it did not exist.
    pub async fn delete(&self, id: String) -> Result<bool, StoreError> {
        self.db
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM prescriptions WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await
    }
}
