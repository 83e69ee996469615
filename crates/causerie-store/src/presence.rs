//! Presence updates on [`UserProfile`] records.
//!
//! [`UserProfile`]: crate::models::UserProfile

use chrono::{SecondsFormat, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::ids::UserId;

impl Database {
    /// Mark a user online, stamping `last_seen`.
    pub fn mark_online(&mut self, user: UserId) -> Result<()> {
        self.set_presence(user, true)
    }

    /// Mark a user offline, stamping `last_seen`.
    pub fn mark_offline(&mut self, user: UserId) -> Result<()> {
        self.set_presence(user, false)
    }

    fn set_presence(&mut self, user: UserId, online: bool) -> Result<()> {
        let last_seen = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let affected = self.conn().execute(
            "UPDATE users SET online = ?2, last_seen = ?3 WHERE id = ?1",
            params![user.to_string(), online, last_seen],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::debug!(user = %user, online, "presence updated");
        Ok(())
    }
}
