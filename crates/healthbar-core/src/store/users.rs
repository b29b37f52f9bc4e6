use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::{Database, StoreError, new_id};
use crate::model::{Role, User};

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Account storage.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a new account. Fails with [`StoreError::Conflict`] if the
    /// email is taken.
    pub async fn create(
        &self,
        email: String,
        password_hash: String,
        role: Role,
    ) -> Result<User, StoreError> {
        self.db
            .call(move |conn| {
                let now = Utc::now();
                let user = User {
                    id: new_id(),
                    email,
                    password_hash,
                    role,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO users (id, email, password_hash, role, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        user.id,
                        user.email,
                        user.password_hash,
                        user.role.as_str(),
                        user.created_at,
                        user.updated_at
                    ],
                )?;
                Ok(user)
            })
            .await
    }

    pub async fn find_by_email(&self, email: String) -> Result<Option<User>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                        params![email],
                        user_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn find_by_id(&self, id: String) -> Result<Option<User>, StoreError> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?)
            })
            .await
    }
}
