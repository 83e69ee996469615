//! The SQLite connection handle.
//!
//! A [`Database`] is constructed through [`Database::new`] or
//! [`Database::open_at`], both of which set the pragmas and replay any
//! pending schema migrations, so every handle callers can obtain is fully
//! migrated.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// An open, migrated `causerie.db` connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at its default location, creating it on first run.
    ///
    /// The file lands in the per-user data directory reported by the
    /// platform, e.g. `~/.local/share/causerie/causerie.db` on Linux or
    /// `~/Library/Application Support/com.causerie.causerie/causerie.db`
    /// on macOS.
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "causerie", "causerie").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("causerie.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open a database at an explicit path, creating it if absent.
    ///
    /// Tests point this at a temp directory; embedders with their own
    /// layout use it to keep the file wherever they like.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// The raw connection, for ad-hoc queries the typed helpers don't cover.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The raw connection, mutably (transactions need this).
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Filesystem location of the open database, if it has one.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
