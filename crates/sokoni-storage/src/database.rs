// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer; query modules accept
//! `&Database` and go through `connection().call()`. Do NOT create
//! additional `Connection` instances for writes.

use sokoni_core::SokoniError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Error type used inside query closures: either a raw SQLite failure or a
/// typed domain error to surface unchanged to the caller.
///
/// `?` on rusqlite operations converts automatically; domain errors are
/// wrapped via [`domain_err`] and unwrapped again by [`map_tr_err`], so
/// callers see `NotFound`/`InsufficientStock`/`InvalidState` rather than a
/// generic storage failure.
#[derive(Debug)]
pub(crate) enum StoreError {
    Sql(rusqlite::Error),
    Domain(SokoniError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sql(e) => write!(f, "{e}"),
            StoreError::Domain(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sql(e)
    }
}

/// Wraps a domain error for transport out of a `conn.call` closure.
pub(crate) fn domain_err(err: SokoniError) -> StoreError {
    StoreError::Domain(err)
}

/// Maps a tokio-rusqlite error to `SokoniError`, unwrapping smuggled
/// domain errors.
pub(crate) fn map_tr_err(err: tokio_rusqlite::Error<StoreError>) -> SokoniError {
    match err {
        tokio_rusqlite::Error::Error(StoreError::Domain(e)) => e,
        tokio_rusqlite::Error::Error(StoreError::Sql(e)) => SokoniError::storage(e),
        other => SokoniError::Internal(format!("database connection error: {other}")),
    }
}

fn map_conn_err(err: rusqlite::Error) -> SokoniError {
    SokoniError::Storage {
        source: Box::new(err),
    }
}

/// Handle to the SQLite database behind a single background writer thread.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if necessary) the database at `path`, applies
    /// PRAGMAs, and runs pending migrations.
    pub async fn open(path: &str) -> Result<Self, SokoniError> {
        let conn = Connection::open(path).await.map_err(map_conn_err)?;
        Self::initialize(conn).await
    }

    /// Opens an in-memory database with the full schema. For tests.
    pub async fn open_in_memory() -> Result<Self, SokoniError> {
        let conn = Connection::open_in_memory().await.map_err(map_conn_err)?;
        Self::initialize(conn).await
    }

    async fn initialize(conn: Connection) -> Result<Self, SokoniError> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            migrations::run_migrations(conn).map_err(domain_err)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!("database opened, migrations applied");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, flushing pending writes.
    pub async fn close(self) -> Result<(), SokoniError> {
        self.conn
            .close()
            .await
            .map_err(|e| SokoniError::Internal(format!("database close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_applies_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sessions'",
                    [],
                    |row| row.get(0),
                )?;
                Ok::<_, StoreError>(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_on_disk_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sokoni.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();

        // Second open must not re-apply migrations destructively.
        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
    }

    #[test]
    fn map_tr_err_unwraps_domain_errors() {
        let err = tokio_rusqlite::Error::Error(domain_err(SokoniError::not_found("order", 9)));
        match map_tr_err(err) {
            SokoniError::NotFound { entity, id } => {
                assert_eq!(entity, "order");
                assert_eq!(id, "9");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn map_tr_err_wraps_sql_errors_as_storage() {
        let err = tokio_rusqlite::Error::Error(StoreError::Sql(
            rusqlite::Error::QueryReturnedNoRows,
        ));
        assert!(matches!(map_tr_err(err), SokoniError::Storage { .. }));
    }
}
