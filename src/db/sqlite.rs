use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Ordered schema migrations. Each script records its own version row.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../resources/migrations/001_initial.sql")),
    (2, include_str!("../../resources/migrations/002_lookup_indexes.sql")),
];

/// Schema version this build reads and writes.
pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// Open (or create) the database file at `path`, migrated to the latest schema.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    prepare(Connection::open(path)?)
}

/// Fresh in-memory database with the full schema. Used by tests and dry runs.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    let applied = run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(applied, version = LATEST_SCHEMA_VERSION, "Schema migrated");
    }
    Ok(conn)
}

/// Apply every migration newer than the stored version, each in its own
/// transaction. Returns how many were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, DatabaseError> {
    let current = schema_version(conn)?;
    if current > LATEST_SCHEMA_VERSION {
        return Err(DatabaseError::SchemaTooNew {
            found: current,
            supported: LATEST_SCHEMA_VERSION,
        });
    }

    let mut applied = 0;
    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        tracing::debug!(version, "Applying migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|source| DatabaseError::Migration { version, source })?;
        tx.commit()?;
        applied += 1;
    }
    Ok(applied)
}

/// Stored schema version, 0 for an empty database.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !tracked {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}
