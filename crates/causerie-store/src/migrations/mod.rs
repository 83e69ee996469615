//! Schema versioning.
//!
//! The applied schema version is recorded in SQLite's `user_version`
//! pragma.  Each upgrade step is a module whose `up` brings the schema
//! from version N-1 to N; opening a database replays every step above the
//! recorded version, in order, stamping the pragma after each one.  A file
//! that is already current replays nothing.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Upgrade steps in order: `STEPS[n]` takes the schema from version `n`
/// to `n + 1`.  New steps append here, never reorder.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Bring the schema up to date, applying any steps this file has not seen.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let recorded: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (index, (name, step)) in STEPS.iter().enumerate().skip(recorded as usize) {
        let target = index as u32 + 1;
        tracing::info!(step = name, target, "applying schema migration");
        step(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", target)?;
    }

    Ok(())
}
