//! Live database access.
//!
//! Opens the categorizer database in WAL mode and applies the minimal schema
//! the checkpoint manager relies on:
//! - categories, vendors, transactions, patterns: the categorizer's data
//! - checkpoint_metadata: queryable mirror of checkpoint sidecars
//!
//! The schema version is stamped into `PRAGMA user_version`.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Schema version written to `user_version` once the tables below exist
pub const SCHEMA_VERSION: i64 = 1;

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            parent_id INTEGER REFERENCES categories(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vendors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            category_id INTEGER REFERENCES categories(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fitid TEXT UNIQUE,
            posted_at TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            payee TEXT NOT NULL,
            vendor_id INTEGER REFERENCES vendors(id),
            category_id INTEGER REFERENCES categories(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            vendor_id INTEGER NOT NULL REFERENCES vendors(id),
            priority INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoint_metadata (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            description TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            row_counts TEXT NOT NULL,
            schema_version INTEGER NOT NULL,
            is_auto INTEGER NOT NULL DEFAULT 0,
            parent_checkpoint TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_vendor_id ON transactions(vendor_id)",
        [],
    )?;

    if schema_version(conn)? < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Open the live database, switch it to WAL and make sure the schema exists
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(Error::db(format!("failed to open database {}", path.display())))?;

    conn.busy_timeout(busy_timeout)
        .map_err(Error::db("failed to set busy timeout"))?;

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(Error::db("failed to enable WAL"))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(path = %path.display(), mode = %mode, "database did not switch to WAL mode");
    }

    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(Error::db("failed to enable foreign keys"))?;
    init_schema(&conn).map_err(Error::db("failed to initialize schema"))?;

    Ok(conn)
}

/// Current `PRAGMA user_version` of the database
pub fn schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_schema_and_stamps_version() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir.path().join("tally.db"), Duration::from_secs(1)).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('categories', 'vendors', 'transactions', 'patterns', 'checkpoint_metadata')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tally.db");

        {
            let conn = open(&path, Duration::from_secs(1)).unwrap();
            conn.execute("INSERT INTO categories (name) VALUES ('Groceries')", [])
                .unwrap();
        }

        let conn = open(&path, Duration::from_secs(1)).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn newer_schema_version_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tally.db");

        {
            let conn = open(&path, Duration::from_secs(1)).unwrap();
            conn.pragma_update(None, "user_version", 7).unwrap();
        }

        let conn = open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 7);
    }
}
