//! Snapshot engine.
//!
//! Flushes the write-ahead log into the main database file, then copies the
//! whole database with the first strategy that is supported:
//! - `VacuumInto`: SQLite's `VACUUM INTO`, written to a temp file and renamed
//! - `FileCopy`: raw atomic copy of the database file
//!
//! Both leave either a complete file at the destination or nothing.

use rusqlite::Connection;
use std::fs::{self, File};
use std::path::Path;

use super::copier::{self, sibling};
use crate::error::{Error, Result};

/// One way of producing a complete copy of the live database at `dest`
pub trait SnapshotStrategy {
    fn name(&self) -> &'static str;
    fn supported(&self, conn: &Connection) -> bool;
    fn snapshot(&self, conn: &Connection, source: &Path, dest: &Path) -> Result<()>;
}

/// `VACUUM INTO`, available from SQLite 3.27
pub struct VacuumInto;

impl SnapshotStrategy for VacuumInto {
    fn name(&self) -> &'static str {
        "vacuum-into"
    }

    fn supported(&self, _conn: &Connection) -> bool {
        rusqlite::version_number() >= 3_027_000
    }

    fn snapshot(&self, conn: &Connection, _source: &Path, dest: &Path) -> Result<()> {
        copier::validate_path(dest)?;

        let tmp = sibling(dest, ".tmp");
        let tmp_str = tmp.to_str().ok_or_else(|| Error::InvalidPath {
            path: tmp.clone(),
            reason: "path is not valid UTF-8",
        })?;

        // VACUUM INTO refuses to overwrite, clear anything a crash left behind
        if tmp.exists() {
            fs::remove_file(&tmp)
                .map_err(Error::io(format!("failed to remove stale {}", tmp.display())))?;
        }

        let result = conn
            .execute("VACUUM INTO ?1", [tmp_str])
            .map_err(Error::db("VACUUM INTO failed"))
            .and_then(|_| {
                File::open(&tmp)
                    .and_then(|f| f.sync_all())
                    .map_err(Error::io(format!("failed to sync {}", tmp.display())))
            })
            .and_then(|()| {
                fs::rename(&tmp, dest)
                    .map_err(Error::io(format!("failed to move {} into place", dest.display())))
            });

        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), error = %e, "failed to remove partial snapshot");
                }
            }
        }

        result
    }
}

/// Raw copy of the database file through the atomic copier
pub struct FileCopy;

impl SnapshotStrategy for FileCopy {
    fn name(&self) -> &'static str {
        "file-copy"
    }

    fn supported(&self, _conn: &Connection) -> bool {
        true
    }

    fn snapshot(&self, _conn: &Connection, source: &Path, dest: &Path) -> Result<()> {
        copier::copy_atomic(source, dest).map(|_| ())
    }
}

pub struct SnapshotEngine {
    strategies: Vec<Box<dyn SnapshotStrategy>>,
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        SnapshotEngine {
            strategies: vec![Box::new(VacuumInto), Box::new(FileCopy)],
        }
    }
}

impl SnapshotEngine {
    /// Engine that tries `strategies` in order
    pub fn with_strategies(strategies: Vec<Box<dyn SnapshotStrategy>>) -> Self {
        SnapshotEngine { strategies }
    }

    /// Flush the WAL and copy the database at `source` to `dest`.
    ///
    /// Returns the name of the strategy that produced the snapshot.
    pub fn run(&self, conn: &Connection, source: &Path, dest: &Path) -> Result<&'static str> {
        flush_wal(conn)?;

        for strategy in &self.strategies {
            if !strategy.supported(conn) {
                tracing::debug!(strategy = strategy.name(), "snapshot strategy not supported, trying next");
                continue;
            }

            strategy.snapshot(conn, source, dest)?;
            tracing::debug!(strategy = strategy.name(), dest = %dest.display(), "snapshot written");
            return Ok(strategy.name());
        }

        Err(Error::NoStrategy)
    }
}

/// Merge the write-ahead log into the main database file
pub fn flush_wal(conn: &Connection) -> Result<()> {
    let (busy, log, checkpointed): (i64, i64, i64) = conn
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(Error::db("failed to checkpoint write-ahead log"))?;

    if busy != 0 {
        tracing::warn!(log, checkpointed, "write-ahead log checkpoint was blocked by another connection");
    }

    Ok(())
}
