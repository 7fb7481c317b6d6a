// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage)
//! - Auth tokens (encrypted credentials)
//! - User sheets (active spreadsheet selection)
//!
//! All access goes through a single tokio-rusqlite background connection;
//! multi-statement updates run inside explicit transactions so a racing
//! refresh and revoke cannot interleave half-written rows.

use crate::error::AppError;
use crate::models::{CredentialRow, User, UserSheet};
use rusqlite::params;

/// Convert a tokio-rusqlite error into an application database error.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> AppError {
    AppError::Database(e.to_string())
}

/// SQLite database client.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: &str) -> Result<Self, AppError> {
        let conn = tokio_rusqlite::Connection::open(path.to_string())
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let db = Self { conn };
        db.init_schema().await?;

        tracing::info!(path, "Connected to SQLite database");
        Ok(db)
    }

    /// Create tables and pragmas. Idempotent.
    async fn init_schema(&self) -> Result<(), AppError> {
        self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;

                     CREATE TABLE IF NOT EXISTS users (
                         user_id      TEXT PRIMARY KEY,
                         display_name TEXT NOT NULL DEFAULT '',
                         created_at   TEXT NOT NULL,
                         updated_at   TEXT NOT NULL
                     );

                     CREATE TABLE IF NOT EXISTS auth_tokens (
                         user_id           TEXT PRIMARY KEY
                                           REFERENCES users(user_id),
                         encrypted_payload BLOB NOT NULL,
                         expiry            TEXT NOT NULL,
                         updated_at        TEXT NOT NULL
                     );

                     CREATE TABLE IF NOT EXISTS user_sheets (
                         user_id           TEXT NOT NULL
                                           REFERENCES users(user_id),
                         spreadsheet_id    TEXT NOT NULL,
                         spreadsheet_title TEXT,
                         is_active         INTEGER NOT NULL DEFAULT 1,
                         updated_at        TEXT NOT NULL,
                         PRIMARY KEY (user_id, spreadsheet_id)
                     );",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by chat-platform ID.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, display_name, created_at, updated_at
                     FROM users WHERE user_id = ?1",
                )?;
                let result = stmt.query_row(params![user_id], |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                });
                match result {
                    Ok(user) => Ok(Some(user)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Create or update a user profile.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let user = user.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (user_id, display_name, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         display_name = excluded.display_name,
                         updated_at = excluded.updated_at",
                    params![
                        user.user_id,
                        user.display_name,
                        user.created_at,
                        user.updated_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    // ─── Credential Operations ───────────────────────────────────

    /// Get the encrypted credential row for a user.
    pub async fn get_credential(&self, user_id: &str) -> Result<Option<CredentialRow>, AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, encrypted_payload, expiry, updated_at
                     FROM auth_tokens WHERE user_id = ?1",
                )?;
                let result = stmt.query_row(params![user_id], |row| {
                    Ok(CredentialRow {
                        user_id: row.get(0)?,
                        encrypted_payload: row.get(1)?,
                        expiry: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                });
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Store an encrypted credential row, creating the user row if the
    /// callback beat the first chat interaction. Single transaction.
    pub async fn put_credential(&self, row: &CredentialRow) -> Result<(), AppError> {
        let row = row.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO users (user_id, display_name, created_at, updated_at)
                     VALUES (?1, '', ?2, ?2)",
                    params![row.user_id, row.updated_at],
                )?;
                tx.execute(
                    "INSERT INTO auth_tokens (user_id, encrypted_payload, expiry, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         encrypted_payload = excluded.encrypted_payload,
                         expiry = excluded.expiry,
                         updated_at = excluded.updated_at",
                    params![row.user_id, row.encrypted_payload, row.expiry, row.updated_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Delete a credential row (revocation). Returns true if a row existed.
    pub async fn delete_credential(&self, user_id: &str) -> Result<bool, AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM auth_tokens WHERE user_id = ?1", params![user_id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    // ─── Active Sheet Operations ─────────────────────────────────

    /// Select `spreadsheet_id` as the user's active sheet.
    ///
    /// Deactivates any previous selection and upserts the new one inside a
    /// single transaction, so exactly zero or one row per user is active.
    pub async fn set_active_sheet(
        &self,
        user_id: &str,
        spreadsheet_id: &str,
        title: Option<&str>,
    ) -> Result<(), AppError> {
        let user_id = user_id.to_string();
        let spreadsheet_id = spreadsheet_id.to_string();
        let title = title.map(|t| t.to_string());
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO users (user_id, display_name, created_at, updated_at)
                     VALUES (?1, '', ?2, ?2)",
                    params![user_id, now],
                )?;
                tx.execute(
                    "UPDATE user_sheets SET is_active = 0, updated_at = ?2
                     WHERE user_id = ?1 AND is_active = 1",
                    params![user_id, now],
                )?;
                tx.execute(
                    "INSERT INTO user_sheets
                         (user_id, spreadsheet_id, spreadsheet_title, is_active, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4)
                     ON CONFLICT(user_id, spreadsheet_id) DO UPDATE SET
                         spreadsheet_title = excluded.spreadsheet_title,
                         is_active = 1,
                         updated_at = excluded.updated_at",
                    params![user_id, spreadsheet_id, title, now],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Get the user's active sheet selection, if any.
    pub async fn get_active_sheet(&self, user_id: &str) -> Result<Option<UserSheet>, AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, spreadsheet_id, spreadsheet_title, is_active, updated_at
                     FROM user_sheets WHERE user_id = ?1 AND is_active = 1",
                )?;
                let result = stmt.query_row(params![user_id], |row| {
                    Ok(UserSheet {
                        user_id: row.get(0)?,
                        spreadsheet_id: row.get(1)?,
                        spreadsheet_title: row.get(2)?,
                        is_active: row.get::<_, i64>(3)? != 0,
                        updated_at: row.get(4)?,
                    })
                });
                match result {
                    Ok(sheet) => Ok(Some(sheet)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// All sheet selections ever made by a user (active and not).
    pub async fn sheets_for_user(&self, user_id: &str) -> Result<Vec<UserSheet>, AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, spreadsheet_id, spreadsheet_title, is_active, updated_at
                     FROM user_sheets WHERE user_id = ?1 ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map(params![user_id], |row| {
                    Ok(UserSheet {
                        user_id: row.get(0)?,
                        spreadsheet_id: row.get(1)?,
                        spreadsheet_title: row.get(2)?,
                        is_active: row.get::<_, i64>(3)? != 0,
                        updated_at: row.get(4)?,
                    })
                })?;
                let mut sheets = Vec::new();
                for row in rows {
                    sheets.push(row?);
                }
                Ok(sheets)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Deactivate and forget all sheet selections for a user (logout).
    pub async fn clear_sheets(&self, user_id: &str) -> Result<(), AppError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM user_sheets WHERE user_id = ?1",
                    params![user_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
