//! CRUD operations for [`UserProfile`] records (the user directory).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::ids::UserId;
use crate::models::{NewProfile, UserProfile};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a new directory entry.
    ///
    /// Fails with [`StoreError::Validation`] when the full name or email is
    /// empty, and with [`StoreError::Conflict`] when a profile already
    /// exists for the given id.
    pub fn create_profile(&mut self, new: &NewProfile) -> Result<UserProfile> {
        let full_name = new.full_name.trim();
        if full_name.is_empty() {
            return Err(StoreError::Validation("full name must not be empty".into()));
        }
        let email = new.email.trim();
        if email.is_empty() {
            return Err(StoreError::Validation("email must not be empty".into()));
        }

        let existing: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![new.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::Conflict(format!(
                "profile {} is already registered",
                new.id
            )));
        }

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.conn().execute(
            "INSERT INTO users (id, full_name, gender, email, online, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)",
            params![
                new.id.to_string(),
                full_name,
                new.gender.as_str(),
                email,
                created_at,
            ],
        )?;

        tracing::info!(user = %new.id, "registered directory profile");

        self.profile(new.id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single profile by user id.
    pub fn profile(&self, id: UserId) -> Result<UserProfile> {
        self.conn()
            .query_row(
                "SELECT id, full_name, gender, email, online, last_seen, created_at
                 FROM users
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List every profile except the given user's own, ordered by name.
    ///
    /// This is the sidebar listing: the set of people the current user can
    /// start a conversation with.
    pub fn list_others(&self, current: UserId) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, full_name, gender, email, online, last_seen, created_at
             FROM users
             WHERE id != ?1
             ORDER BY full_name ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![current.to_string()], row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`UserProfile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let id_str: String = row.get(0)?;
    let full_name: String = row.get(1)?;
    let gender_str: String = row.get(2)?;
    let email: String = row.get(3)?;
    let online: bool = row.get(4)?;
    let last_seen_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    let id = id_str
        .parse::<UserId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;

    let gender = gender_str
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;

    let last_seen: Option<DateTime<Utc>> = last_seen_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(UserProfile {
        id,
        full_name,
        gender,
        email,
        online,
        last_seen,
        created_at,
    })
}
