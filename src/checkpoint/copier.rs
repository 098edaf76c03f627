//! Atomic file copy.
//!
//! Bytes go to a `.tmp` sibling of the destination, are fsynced, then renamed
//! over the destination. A reader of the destination path sees either the old
//! file or the complete new one, never a partial copy.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Reject paths that are relative or contain a `..` component
pub fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "path must be absolute",
        });
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "path must not contain '..'",
        });
    }

    Ok(())
}

/// Sibling of `path` with `suffix` appended to the file name
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Copy `src` over `dest` through a temp file and an atomic rename.
///
/// Returns the number of bytes copied. On failure the temp file is removed
/// and `dest` is left as it was.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<u64> {
    validate_path(src)?;
    validate_path(dest)?;

    let tmp = sibling(dest, ".tmp");

    match copy_to_tmp(src, &tmp) {
        Ok(bytes) => {
            if let Err(e) = fs::rename(&tmp, dest) {
                remove_tmp(&tmp);
                return Err(Error::Io {
                    context: format!("failed to move {} into place", dest.display()),
                    source: e,
                });
            }
            Ok(bytes)
        }
        Err(e) => {
            remove_tmp(&tmp);
            Err(Error::Io {
                context: format!("failed to copy {} to {}", src.display(), tmp.display()),
                source: e,
            })
        }
    }
}

fn copy_to_tmp(src: &Path, tmp: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(tmp)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(bytes)
}

fn remove_tmp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
        }
    }
}
