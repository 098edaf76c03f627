//! Error types for checkpoint operations.
//!
//! Callers branch on the sentinel variants (`NotFound`, `AlreadyExists`,
//! `Corrupted`, `DiskSpaceLow`, `InvalidId`); everything else is an I/O,
//! database or metadata failure wrapped with the operation that hit it.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No snapshot file exists for this id
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// A snapshot file already exists for this id
    #[error("checkpoint already exists: {0}")]
    AlreadyExists(String),

    /// Integrity check on the snapshot failed; the live database was not touched
    #[error("checkpoint {id} is corrupted: {detail}")]
    Corrupted { id: String, detail: String },

    /// Space probe in the checkpoint directory could not allocate the estimate
    #[error("insufficient disk space in {}: need {required} bytes", dir.display())]
    DiskSpaceLow {
        dir: PathBuf,
        required: u64,
        #[source]
        source: std::io::Error,
    },

    /// Tag or id contains a path separator or `..`
    #[error("invalid checkpoint id {0:?}: must not contain '/', '\\' or '..'")]
    InvalidId(String),

    /// Every snapshot strategy reported itself unsupported
    #[error("no snapshot strategy is supported for this database")]
    NoStrategy,

    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Metadata {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Error {
        let context = context.into();
        move |source| Error::Io { context, source }
    }

    pub fn db(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Error {
        let context = context.into();
        move |source| Error::Database { context, source }
    }

    pub fn metadata(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> Error {
        let context = context.into();
        move |source| Error::Metadata { context, source }
    }

    /// Process exit status the CLI uses for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::Corrupted { .. } => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_prefixed_to_source() {
        let err = Error::io("failed to read sidecar")(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "failed to read sidecar: denied");
    }

    #[test]
    fn database_context_is_prefixed_to_source() {
        let err = Error::db("failed to read schema version")(rusqlite::Error::InvalidQuery);
        assert!(matches!(err, Error::Database { ref context, .. } if context == "failed to read schema version"));
        assert!(err.to_string().starts_with("failed to read schema version: "));
    }

    #[test]
    fn exit_codes_distinguish_sentinels() {
        assert_eq!(Error::NotFound("x".into()).exit_code(), 2);
        assert_eq!(
            Error::Corrupted { id: "x".into(), detail: "bad".into() }.exit_code(),
            3
        );
        assert_eq!(Error::InvalidId("../x".into()).exit_code(), 1);
    }
}
