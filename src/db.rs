// 🗄️ Store - the one owned handle to the ledger database
//
// The store is opened explicitly, passed by reference to whoever needs it,
// and released when closed or dropped. There is no process-wide connection.
//
// Also home to the typed query layer: every entity implements `Entity`, and
// generic helpers (`list_all`, `count`, `delete_all`) work against those
// shapes instead of against untyped rows.

use crate::entities::EntityKind;
use crate::error::{LedgerError, Result};
use rusqlite::{Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// ENTITY MAPPING
// ============================================================================

/// Table mapping for one entity shape.
pub trait Entity: Sized {
    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Column list in the order `from_row` reads them.
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub fn list_all<E: Entity>(conn: &Connection) -> Result<Vec<E>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        E::COLUMNS,
        E::TABLE,
        E::ORDER_BY
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], E::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn count<E: Entity>(conn: &Connection) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

pub fn delete_all<E: Entity>(conn: &Connection) -> Result<usize> {
    let sql = format!("DELETE FROM {}", E::TABLE);
    Ok(conn.execute(&sql, [])?)
}

/// Fetch one entity by its integer id column.
pub fn find_by_id<E: Entity>(conn: &Connection, id: i64) -> Result<Option<E>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", E::COLUMNS, E::TABLE);
    Ok(conn.query_row(&sql, [id], E::from_row).optional()?)
}

/// Like `find_by_id`, but a missing row is an error.
pub fn get_by_id<E: Entity>(conn: &Connection, id: i64) -> Result<E> {
    find_by_id(conn, id)?.ok_or(LedgerError::NotFound { kind: E::KIND, id })
}

/// Run `f` inside a named savepoint: released on `Ok`, rolled back on `Err`.
/// Nests inside an outer transaction, or stands alone on a bare connection.
pub fn with_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {}", name))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))
            {
                warn!(savepoint = name, error = %rollback_err, "savepoint rollback failed");
            }
            Err(err)
        }
    }
}

// ============================================================================
// SCHEMA VERSION MARKER
// ============================================================================

/// Schema version kept by SQLite itself in the database header.
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(u32::try_from(raw).unwrap_or(0))
}

/// Writes the marker. Inside an open transaction the write commits or rolls
/// back together with the rest of it.
pub fn write_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ============================================================================
// STORE
// ============================================================================

pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|source| LedgerError::Open {
            path: path.clone(),
            source,
        })?;
        Self::configure(&conn).map_err(|source| LedgerError::Open {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "database opened");
        Ok(Store {
            conn,
            path: Some(path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Store { conn, path: None })
    }

    fn configure(conn: &Connection) -> rusqlite::Result<()> {
        // WAL for crash recovery; in-memory databases silently stay in "memory" mode
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(read_schema_version(&self.conn)?)
    }

    /// Flush the WAL into the main database file.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Close explicitly, surfacing errors that a plain drop would swallow.
    pub fn close(self) -> Result<()> {
        let path = self.path.clone();
        self.conn.close().map_err(|(_, err)| err)?;
        if let Some(path) = path {
            debug!(path = %path.display(), "database closed");
        }
        Ok(())
    }
}
