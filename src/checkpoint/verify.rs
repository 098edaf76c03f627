//! Snapshot integrity verification.
//!
//! The candidate file is opened on its own connection, never through the
//! live handle, and checked with `PRAGMA integrity_check`.

use rusqlite::{Connection, OpenFlags};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    Healthy,
    Corrupted(String),
}

impl Integrity {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Integrity::Healthy)
    }
}

/// Run a structural consistency check on the database file at `path`.
///
/// A file that cannot be opened or is not a database reports as corrupted.
pub fn check(path: &Path) -> Integrity {
    // read-write without CREATE: a missing file fails instead of being created,
    // and a WAL-mode copy can still set up its shared memory file
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = match Connection::open_with_flags(path, flags) {
        Ok(conn) => conn,
        Err(e) => return Integrity::Corrupted(format!("cannot open: {e}")),
    };

    match integrity_rows(&conn) {
        Ok(rows) if rows.len() == 1 && rows[0] == "ok" => Integrity::Healthy,
        Ok(rows) if rows.is_empty() => Integrity::Corrupted("integrity check returned nothing".into()),
        Ok(rows) => Integrity::Corrupted(rows.join("; ")),
        Err(e) => Integrity::Corrupted(e.to_string()),
    }
}

fn integrity_rows(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
