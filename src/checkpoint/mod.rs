//! Checkpoint manager.
//!
//! Point-in-time snapshots of the live database, stored as
//!
//! ```text
//! <dbdir>/checkpoints/<id>.db          full database snapshot
//! <dbdir>/checkpoints/<id>.meta.json   sidecar metadata
//! ```
//!
//! Supports:
//! - Creating user and automatic checkpoints
//! - Listing, inspecting and deleting checkpoints
//! - Restoring the live database from a verified checkpoint
//! - Pruning automatic checkpoints beyond a fixed retention count
//!
//! All operations are synchronous. The live connection is passed in by the
//! caller; restore takes it by value and closes it, reopening is up to the
//! caller.

pub mod copier;
pub mod diff;
pub mod engine;
pub mod metadata;
pub mod space;
pub mod verify;

use chrono::Utc;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db;
use crate::error::{Error, Result};
use copier::sibling;
use engine::SnapshotEngine;
use verify::Integrity;

pub use metadata::Checkpoint;

/// Automatic checkpoints kept by the retention sweep
pub const DEFAULT_AUTO_RETENTION: usize = 5;

pub const SNAPSHOT_SUFFIX: &str = ".db";
const RESTORE_BACKUP_SUFFIX: &str = ".restore-backup";

// one explicit query per table; tables missing from older schemas count as 0
const ROW_COUNT_QUERIES: [(&str, &str); 4] = [
    ("transactions", "SELECT COUNT(*) FROM transactions"),
    ("vendors", "SELECT COUNT(*) FROM vendors"),
    ("categories", "SELECT COUNT(*) FROM categories"),
    ("patterns", "SELECT COUNT(*) FROM patterns"),
];

/// Reject ids that could escape the checkpoint directory
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(Error::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Row count per known table; a table whose query fails records 0
pub fn row_counts(conn: &Connection) -> BTreeMap<String, i64> {
    ROW_COUNT_QUERIES
        .iter()
        .map(|(table, sql)| {
            let count = conn
                .query_row(sql, [], |row| row.get::<_, i64>(0))
                .unwrap_or_else(|e| {
                    tracing::debug!(table, error = %e, "row count unavailable, recording 0");
                    0
                });
            (table.to_string(), count)
        })
        .collect()
}

fn timestamp_tag() -> String {
    Utc::now().format("%Y%m%d-%H%M%S-%6f").to_string()
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(Error::io("failed to resolve current directory"))?;
    Ok(cwd.join(path))
}

pub struct CheckpointManager {
    db_path: PathBuf,
    checkpoint_dir: PathBuf,
    engine: SnapshotEngine,
    auto_retention: usize,
}

impl CheckpointManager {
    /// Manager for the database at `db_path`, with checkpoints in a
    /// `checkpoints/` directory next to it
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = absolute(db_path.into())?;
        let checkpoint_dir = db_path
            .parent()
            .map(|p| p.join("checkpoints"))
            .ok_or_else(|| Error::InvalidPath {
                path: db_path.clone(),
                reason: "database path has no parent directory",
            })?;
        Self::with_checkpoint_dir(db_path, checkpoint_dir)
    }

    pub fn with_checkpoint_dir(db_path: impl Into<PathBuf>, checkpoint_dir: impl Into<PathBuf>) -> Result<Self> {
        let db_path = absolute(db_path.into())?;
        let checkpoint_dir = absolute(checkpoint_dir.into())?;
        copier::validate_path(&db_path)?;
        copier::validate_path(&checkpoint_dir)?;

        Ok(CheckpointManager {
            db_path,
            checkpoint_dir,
            engine: SnapshotEngine::default(),
            auto_retention: DEFAULT_AUTO_RETENTION,
        })
    }

    pub fn with_engine(mut self, engine: SnapshotEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_auto_retention(mut self, keep: usize) -> Self {
        self.auto_retention = keep;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn snapshot_path(&self, id: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{id}{SNAPSHOT_SUFFIX}"))
    }

    /// Create a user checkpoint. An empty `tag` becomes `checkpoint-<timestamp>`.
    pub fn create(&self, conn: &Connection, tag: &str, description: &str) -> Result<Checkpoint> {
        let id = if tag.is_empty() {
            format!("checkpoint-{}", timestamp_tag())
        } else {
            tag.to_string()
        };
        self.create_checkpoint(conn, &id, description, false)
    }

    /// Create an automatic checkpoint, then prune automatic checkpoints
    /// beyond the retention count. Pruning failures are logged only.
    pub fn auto_checkpoint(&self, conn: &Connection, prefix: &str) -> Result<Checkpoint> {
        let checkpoint = self.create_auto(conn, prefix)?;
        self.prune_auto(conn, None);
        Ok(checkpoint)
    }

    fn create_auto(&self, conn: &Connection, prefix: &str) -> Result<Checkpoint> {
        let id = format!("auto-{prefix}-{}", timestamp_tag());
        let description = format!("Automatic checkpoint before {prefix}");
        self.create_checkpoint(conn, &id, &description, true)
    }

    fn create_checkpoint(&self, conn: &Connection, id: &str, description: &str, is_auto: bool) -> Result<Checkpoint> {
        validate_id(id)?;

        let snapshot = self.snapshot_path(id);
        if snapshot.exists() {
            return Err(Error::AlreadyExists(id.to_string()));
        }

        let schema_version = db::schema_version(conn).map_err(Error::db("failed to read schema version"))?;
        let row_counts = row_counts(conn);

        fs::create_dir_all(&self.checkpoint_dir).map_err(Error::io(format!(
            "failed to create checkpoint directory {}",
            self.checkpoint_dir.display()
        )))?;

        let db_size = fs::metadata(&self.db_path)
            .map_err(Error::io(format!("failed to stat {}", self.db_path.display())))?
            .len();
        space::ensure_available(&self.checkpoint_dir, space::estimate(db_size))?;

        let strategy = self.engine.run(conn, &self.db_path, &snapshot)?;

        let checkpoint = match self.record(&snapshot, id, description, row_counts, schema_version, is_auto) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&snapshot) {
                    tracing::warn!(path = %snapshot.display(), error = %rm, "failed to remove snapshot without metadata");
                }
                return Err(e);
            }
        };

        if let Err(e) = metadata::mirror(conn, &checkpoint) {
            tracing::warn!(id, error = %e, "checkpoint metadata not mirrored to database");
        }

        tracing::info!(id, strategy, size = checkpoint.file_size, is_auto, "checkpoint created");
        Ok(checkpoint)
    }

    fn record(
        &self,
        snapshot: &Path,
        id: &str,
        description: &str,
        row_counts: BTreeMap<String, i64>,
        schema_version: i64,
        is_auto: bool,
    ) -> Result<Checkpoint> {
        let file_size = fs::metadata(snapshot)
            .map_err(Error::io(format!("failed to stat {}", snapshot.display())))?
            .len();

        let checkpoint = Checkpoint {
            id: id.to_string(),
            created_at: Utc::now(),
            description: description.to_string(),
            file_size: i64::try_from(file_size).unwrap_or(i64::MAX),
            row_counts,
            schema_version,
            is_auto,
            parent_checkpoint: None,
        };

        metadata::save(&self.checkpoint_dir, &checkpoint)?;
        Ok(checkpoint)
    }

    /// All checkpoints with readable metadata, most recent first
    pub fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = metadata::scan(&self.checkpoint_dir)?;
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    pub fn info(&self, id: &str) -> Result<Checkpoint> {
        validate_id(id)?;

        if !self.snapshot_path(id).exists() {
            return Err(Error::NotFound(id.to_string()));
        }

        metadata::load(&metadata::sidecar_path(&self.checkpoint_dir, id))
    }

    /// Replace the live database with checkpoint `id`.
    ///
    /// The snapshot is verified before anything is touched. `conn` is closed
    /// in every case; the caller reopens the database afterwards. If installing
    /// the snapshot fails, the previous database file is copied back on a
    /// best-effort basis and the original error is returned.
    pub fn restore(&self, conn: Connection, id: &str) -> Result<Checkpoint> {
        validate_id(id)?;

        let snapshot = self.snapshot_path(id);
        if !snapshot.exists() {
            return Err(Error::NotFound(id.to_string()));
        }

        let checkpoint = metadata::load(&metadata::sidecar_path(&self.checkpoint_dir, id))?;

        if let Integrity::Corrupted(detail) = verify::check(&snapshot) {
            return Err(Error::Corrupted {
                id: id.to_string(),
                detail,
            });
        }

        conn.close()
            .map_err(|(_, e)| Error::Database {
                context: "failed to close live database".to_string(),
                source: e,
            })?;

        let backup = sibling(&self.db_path, RESTORE_BACKUP_SUFFIX);
        copier::copy_atomic(&self.db_path, &backup)?;

        if let Err(e) = copier::copy_atomic(&snapshot, &self.db_path) {
            tracing::warn!(id, error = %e, "installing checkpoint failed, putting previous database back");
            match copier::copy_atomic(&backup, &self.db_path) {
                Ok(_) => tracing::info!(path = %self.db_path.display(), "previous database put back"),
                Err(re) => tracing::error!(
                    backup = %backup.display(),
                    error = %re,
                    "failed to put previous database back, a copy remains at the backup path"
                ),
            }
            return Err(e);
        }

        // a log left from the old file must not be replayed onto the restored one
        for suffix in ["-wal", "-shm"] {
            remove_if_present(&sibling(&self.db_path, suffix));
        }
        remove_if_present(&backup);

        tracing::info!(id, schema_version = checkpoint.schema_version, "checkpoint restored");
        Ok(checkpoint)
    }

    /// Save the current state as an automatic checkpoint, then restore `id`.
    ///
    /// The retention sweep after the safety checkpoint never prunes `id`, even
    /// when it is the oldest automatic checkpoint still kept. Returns the
    /// safety checkpoint and the restored one.
    pub fn restore_with_safety_checkpoint(&self, conn: Connection, id: &str) -> Result<(Checkpoint, Checkpoint)> {
        self.info(id)?;

        let safety = self.create_auto(&conn, "restore")?;
        self.prune_auto(&conn, Some(id));

        let restored = self.restore(conn, id)?;
        Ok((safety, restored))
    }

    /// Remove checkpoint `id`. Only the snapshot file removal is fatal.
    pub fn delete(&self, conn: &Connection, id: &str) -> Result<()> {
        validate_id(id)?;

        let snapshot = self.snapshot_path(id);
        if !snapshot.exists() {
            return Err(Error::NotFound(id.to_string()));
        }

        fs::remove_file(&snapshot)
            .map_err(Error::io(format!("failed to remove {}", snapshot.display())))?;

        self.remove_metadata(conn, id);

        tracing::info!(id, "checkpoint deleted");
        Ok(())
    }

    fn remove_metadata(&self, conn: &Connection, id: &str) {
        remove_if_present(&metadata::sidecar_path(&self.checkpoint_dir, id));

        if let Err(e) = metadata::unmirror(conn, id) {
            tracing::warn!(id, error = %e, "mirrored metadata not removed");
        }
    }

    /// Keep the most recent automatic checkpoints that still have a snapshot
    /// file and delete the rest, except `protect`. Sidecars of automatic
    /// checkpoints whose snapshot is gone don't count and are removed.
    fn prune_auto(&self, conn: &Connection, protect: Option<&str>) {
        let checkpoints = match self.list() {
            Ok(checkpoints) => checkpoints,
            Err(e) => {
                tracing::warn!(error = %e, "retention sweep skipped, could not list checkpoints");
                return;
            }
        };

        let (kept, orphaned): (Vec<_>, Vec<_>) = checkpoints
            .into_iter()
            .filter(|c| c.is_auto && validate_id(&c.id).is_ok())
            .partition(|c| self.snapshot_path(&c.id).exists());

        for checkpoint in &orphaned {
            tracing::warn!(id = %checkpoint.id, "removing metadata of automatic checkpoint without a snapshot");
            self.remove_metadata(conn, &checkpoint.id);
        }

        for checkpoint in kept.iter().skip(self.auto_retention) {
            if protect == Some(checkpoint.id.as_str()) {
                continue;
            }
            if let Err(e) = self.delete(conn, &checkpoint.id) {
                tracing::warn!(id = %checkpoint.id, error = %e, "failed to prune automatic checkpoint");
            }
        }
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}
