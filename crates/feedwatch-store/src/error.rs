//! Error types for cursor persistence.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cursor io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cursor file {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("cursor file {path} belongs to key {found:?}, expected {expected:?}")]
    KeyMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
