//! Hospital visits.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Database, StoreError, new_id};
use crate::model::{HospitalVisit, VisitInput};

const VISIT_COLUMNS: &str =
    "id, patient_id, hospital_name, visit_date, reason, notes, created_at, updated_at";

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<HospitalVisit> {
    Ok(HospitalVisit {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        hospital_name: row.get(2)?,
        visit_date: row.get(3)?,
        reason: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn visit_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<HospitalVisit>> {
    conn.query_row(
        &format!("SELECT {VISIT_COLUMNS} FROM hospital_visits WHERE id = ?1"),
        params![id],
        visit_from_row,
    )
    .optional()
}

/// Visit storage.
#[derive(Debug, Clone)]
pub struct TimelineRepository {
    db: Database,
}

impl TimelineRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a visit to `patient_id`'s timeline.
    pub async fn create(
        &self,
        patient_id: String,
        input: VisitInput,
    ) -> Result<HospitalVisit, StoreError> {
        self.db
            .call(move |conn| {
                let now = Utc::now();
                let visit = HospitalVisit {
                    id: new_id(),
                    patient_id,
                    hospital_name: input.hospital_name,
                    visit_date: input.visit_date,
                    reason: input.reason,
                    notes: input.notes,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO hospital_visits
                         (id, patient_id, hospital_name, visit_date, reason, notes,
                          created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        visit.id,
                        visit.patient_id,
                        visit.hospital_name,
                        visit.visit_date,
                        visit.reason,
                        visit.notes,
                        visit.created_at,
                        visit.updated_at
                    ],
                )?;
                Ok(visit)
            })
            .await
    }

    pub async fn get(&self, id: String) -> Result<Option<HospitalVisit>, StoreError> {
        self.db.call(move |conn| Ok(visit_by_id(conn, &id)?)).await
    }

    /// Lists `patient_id`'s visits, latest visit date first.
    pub async fn list_for_patient(
        &self,
        patient_id: String,
    ) -> Result<Vec<HospitalVisit>, StoreError> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VISIT_COLUMNS} FROM hospital_visits
                     WHERE patient_id = ?1
                     ORDER BY visit_date DESC, created_at DESC"
                ))?;
                let rows = stmt.query_map(params![patient_id], visit_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// Replaces the editable fields of a visit. Returns `None` if missing.
    pub async fn update(
        &self,
        id: String,
        input: VisitInput,
    ) -> Result<Option<HospitalVisit>, StoreError> {
        self.db
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE hospital_visits
                     SET hospital_name = ?1, visit_date = ?2, reason = ?3, notes = ?4,
                         updated_at = ?5
                     WHERE id = ?6",
                    params![
                        input.hospital_name,
                        input.visit_date,
                        input.reason,
                        input.notes,
                        Utc::now(),
                        id
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(visit_by_id(conn, &id)?)
            })
            .await
    }

    /// Deletes a visit. Returns false if it did not exist.
    pub async fn delete(&self, id: String) -> Result<bool, StoreError> {
        self.db
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM hospital_visits WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await
    }
}
