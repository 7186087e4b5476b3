//! SQLite storage: connection setup, migrations and the repository layer.

pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

/// Failures surfaced by the storage layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored status or operation column holds text outside its enum.
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    /// A stored identifier column does not parse as a UUID.
    #[error("Invalid UUID in {field}: {source}")]
    InvalidUuid {
        field: &'static str,
        source: uuid::Error,
    },

    #[error("Migration {version} failed: {source}")]
    Migration {
        version: i64,
        source: rusqlite::Error,
    },

    /// The database was written by a newer build than this one.
    #[error("Schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
}

/// A lock-contention failure, as a busy or unreachable store reports it.
#[cfg(test)]
pub(crate) fn busy(message: &str) -> DatabaseError {
    DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some(message.to_string()),
    ))
}
