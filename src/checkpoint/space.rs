//! Disk space preflight.
//!
//! Before a snapshot is written, a probe file in the checkpoint directory is
//! extended to the estimated snapshot size. If the filesystem refuses, the
//! checkpoint is not attempted.
//!
//! Known limitation: `set_len` only extends the file length. Filesystems with
//! sparse file support accept it without reserving blocks, so the probe can
//! pass while the disk is nearly full.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::error::{Error, Result};

/// Required space for a snapshot of a database of `db_size` bytes (1.1x)
pub fn estimate(db_size: u64) -> u64 {
    db_size.saturating_add(db_size / 10)
}

/// Probe that `dir` can hold `required` more bytes. The probe is always removed.
pub fn ensure_available(dir: &Path, required: u64) -> Result<()> {
    let probe = dir.join(format!(".space-probe-{}", std::process::id()));

    let result = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .and_then(|file| file.set_len(required));

    if let Err(e) = fs::remove_file(&probe) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %probe.display(), error = %e, "failed to remove space probe");
        }
    }

    result.map_err(|source| Error::DiskSpaceLow {
        dir: dir.to_path_buf(),
        required,
        source,
    })
}
