use thiserror::Error;

/// Errors produced by the store layer.
///
/// The first four variants are the domain taxonomy shared by every layer of
/// the system; the rest are infrastructure failures.  [`StoreError::is_transient`]
/// tells callers which failures are worth a bounded retry.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input failed validation (empty name, no content, self-pair, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller is not allowed to perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The operation would violate a state-transition invariant.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// A lock guarding the store was poisoned by a panicking holder.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether this failure is transient and eligible for bounded retry.
    ///
    /// Covers I/O errors and the SQLite busy/locked result codes; domain
    /// errors (validation, permission, missing records, conflicts) are
    /// never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_transient());

        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());

        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Validation("empty".into()).is_transient());
        assert!(!StoreError::Conflict("deleted".into()).is_transient());
        assert!(!StoreError::Forbidden("not a member".into()).is_transient());
    }
}
