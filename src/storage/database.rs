//! Store access using rusqlite.
//!
//! The engine treats the Store as its single durable source of truth:
//! challenge and battle status, participant standings and performance rows
//! all live here. In-memory structures (connection registry, battle clocks)
//! are rebuilt from nothing and hold no authoritative state.

use rusqlite::{Connection, Result as SqliteResult};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};

/// Store wrapper for SQLite operations.
///
/// The connection sits behind a mutex so battle clock tasks running on the
/// tokio runtime can share one handle with request-path callers.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &PathBuf) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connection();

        conn.execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        let current_version = Self::schema_version(&conn)?;

        if current_version < CURRENT_VERSION {
            Self::migrate(&conn, current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn schema_version(conn: &Connection) -> Result<i32, StoreError> {
        let result: SqliteResult<i32> = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(StoreError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(conn: &Connection, from_version: i32) -> Result<(), StoreError> {
        if from_version < 1 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                [CURRENT_VERSION],
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

            tracing::info!("Store migrated to version {}", CURRENT_VERSION);
        }

        // Future migrations would go here:
        // if from_version < 2 { ... }

        Ok(())
    }

    /// Lock and return the underlying connection.
    ///
    /// Callers must not invoke other `Database` consumers while holding the
    /// guard; the mutex is not reentrant.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

/// Parse a stored RFC 3339 timestamp. Corrupt values fall back to now.
pub(crate) fn parse_timestamp(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

/// Parse an optional stored RFC 3339 timestamp.
pub(crate) fn parse_timestamp_opt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.as_deref().map(parse_timestamp)
}

/// Opaque store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_applies_schema() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'battles'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_version_recorded() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let db = Database::open(&path).unwrap();
        drop(db);

        // Reopening runs no further migration and succeeds.
        let db = Database::open(&path).unwrap();
        let conn = db.connection();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
