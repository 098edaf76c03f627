//! Checkpoint metadata persistence.
//!
//! Each checkpoint has a JSON sidecar next to its snapshot file. The sidecar
//! is the source of truth. A copy of every record is also kept in the live
//! database's `checkpoint_metadata` table so checkpoints can be queried with
//! SQL; that mirror may lag or be missing and is never consulted by restore
//! or verification.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::copier::sibling;
use crate::error::{Error, Result};

pub const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub file_size: i64,
    pub row_counts: BTreeMap<String, i64>,
    pub schema_version: i64,
    pub is_auto: bool,
    #[serde(default)]
    pub parent_checkpoint: Option<String>,
}

pub fn sidecar_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}{SIDECAR_SUFFIX}"))
}

/// Write the sidecar through a temp file and rename
pub fn save(dir: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let path = sidecar_path(dir, &checkpoint.id);
    let tmp = sibling(&path, ".tmp");

    let json = serde_json::to_vec_pretty(checkpoint)
        .map_err(Error::metadata(format!("failed to serialize metadata for {}", checkpoint.id)))?;

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&json)?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|()| fs::rename(&tmp, &path)) {
        if let Err(rm) = fs::remove_file(&tmp) {
            if rm.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %rm, "failed to remove partial metadata");
            }
        }
        return Err(Error::Io {
            context: format!("failed to write metadata {}", path.display()),
            source: e,
        });
    }

    Ok(())
}

pub fn load(path: &Path) -> Result<Checkpoint> {
    let content = fs::read(path)
        .map_err(Error::io(format!("failed to read metadata {}", path.display())))?;
    serde_json::from_slice(&content)
        .map_err(Error::metadata(format!("failed to parse metadata {}", path.display())))
}

/// Load every sidecar in `dir`, skipping any that can't be read or parsed
pub fn scan(dir: &Path) -> Result<Vec<Checkpoint>> {
    let mut checkpoints = Vec::new();

    if !dir.exists() {
        return Ok(checkpoints);
    }

    let entries = fs::read_dir(dir)
        .map_err(Error::io(format!("failed to read checkpoint directory {}", dir.display())))?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        let is_sidecar = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(SIDECAR_SUFFIX));
        if !is_sidecar {
            continue;
        }

        match load(&path) {
            Ok(checkpoint) => checkpoints.push(checkpoint),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint metadata"),
        }
    }

    Ok(checkpoints)
}

/// Insert or replace the mirror row for `checkpoint`
pub fn mirror(conn: &Connection, checkpoint: &Checkpoint) -> Result<()> {
    let row_counts = serde_json::to_string(&checkpoint.row_counts)
        .map_err(Error::metadata("failed to encode row counts"))?;

    conn.execute(
        "INSERT OR REPLACE INTO checkpoint_metadata
            (id, created_at, description, file_size, row_counts, schema_version, is_auto, parent_checkpoint)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            checkpoint.id,
            checkpoint.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            checkpoint.description,
            checkpoint.file_size,
            row_counts,
            checkpoint.schema_version,
            checkpoint.is_auto,
            checkpoint.parent_checkpoint.as_deref(),
        ],
    )
    .map_err(Error::db(format!("failed to mirror metadata for {}", checkpoint.id)))?;

    Ok(())
}

pub fn unmirror(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM checkpoint_metadata WHERE id = ?1", params![id])
        .map_err(Error::db(format!("failed to remove mirrored metadata for {id}")))?;
    Ok(())
}

/// Read the mirror table, most recent first
pub fn query_mirror(conn: &Connection) -> Result<Vec<Checkpoint>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, created_at, description, file_size, row_counts, schema_version, is_auto, parent_checkpoint
             FROM checkpoint_metadata
             ORDER BY created_at DESC",
        )
        .map_err(Error::db("failed to query mirrored metadata"))?;

    let checkpoints = stmt
        .query_map([], checkpoint_from_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(Error::db("failed to read mirrored metadata"))?;

    Ok(checkpoints)
}

fn checkpoint_from_row(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
    use rusqlite::types::Type;

    let created_at: String = row.get(1)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    let row_counts: String = row.get(4)?;
    let row_counts = serde_json::from_str(&row_counts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Checkpoint {
        id: row.get(0)?,
        created_at,
        description: row.get(2)?,
        file_size: row.get(3)?,
        row_counts,
        schema_version: row.get(5)?,
        is_auto: row.get(6)?,
        parent_checkpoint: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpoint(id: &str) -> Checkpoint {
        Checkpoint {
            id: id.to_string(),
            created_at: Utc::now(),
            description: "before import".to_string(),
            file_size: 4096,
            row_counts: BTreeMap::from([
                ("transactions".to_string(), 3),
                ("vendors".to_string(), 2),
            ]),
            schema_version: 1,
            is_auto: false,
            parent_checkpoint: None,
        }
    }

    #[test]
    fn sidecar_uses_documented_field_names() {
        let value = serde_json::to_value(checkpoint("c1")).unwrap();
        let object = value.as_object().unwrap();

        for key in [
            "id",
            "created_at",
            "description",
            "file_size",
            "row_counts",
            "schema_version",
            "is_auto",
            "parent_checkpoint",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert!(object["parent_checkpoint"].is_null());
    }

    #[test]
    fn save_then_load_preserves_record() {
        let dir = TempDir::new().unwrap();
        let original = checkpoint("c1");

        save(dir.path(), &original).unwrap();
        let loaded = load(&sidecar_path(dir.path(), "c1")).unwrap();

        assert_eq!(loaded, original);
        assert!(!dir.path().join("c1.meta.json.tmp").exists());
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(sidecar_path(dir.path(), "c1")).unwrap();

        let err = save(dir.path(), &checkpoint("c1")).unwrap_err();

        assert!(matches!(err, Error::Io { .. }));
        assert!(!dir.path().join("c1.meta.json.tmp").exists());
    }

    #[test]
    fn scan_skips_malformed_sidecars() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), &checkpoint("good")).unwrap();
        fs::write(dir.path().join("bad.meta.json"), b"{ not json").unwrap();
        fs::write(dir.path().join("good.db"), b"").unwrap();

        let found = scan(dir.path()).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "good");
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(scan(&dir.path().join("checkpoints")).unwrap().is_empty());
    }

    #[test]
    fn mirror_round_trips_through_table() {
        let dir = TempDir::new().unwrap();
        let conn = crate::db::open(&dir.path().join("tally.db"), std::time::Duration::from_secs(1)).unwrap();
        let original = checkpoint("c1");

        mirror(&conn, &original).unwrap();
        mirror(&conn, &original).unwrap();

        let rows = query_mirror(&conn).unwrap();
        assert_eq!(rows, vec![original]);

        unmirror(&conn, "c1").unwrap();
        assert!(query_mirror(&conn).unwrap().is_empty());
    }

    #[test]
    fn mirror_without_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(mirror(&conn, &checkpoint("c1")), Err(Error::Database { .. })));
    }
}
