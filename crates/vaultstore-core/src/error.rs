//! Error types for the volume save/load boundary.
//!
//! Tree operations report failure through their return values (`None`,
//! `false`, zero counts) and never through this module. Only the file I/O
//! and image-decoding paths produce a `StoreError`.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Errors produced while saving or loading a volume image.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// The load path exists but is not a regular file
    NotRegularFile {
        /// Path that was rejected
        path: PathBuf,
    },

    /// The volume file is empty
    EmptyFile {
        /// Path to the empty file
        path: PathBuf,
    },

    /// The volume image is malformed and cannot be decoded
    Corrupt {
        /// Byte offset where decoding failed
        offset: u64,
        /// Description of the problem
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            StoreError::NotRegularFile { path } => {
                write!(f, "{} is not a regular file", path.display())
            }

            StoreError::EmptyFile { path } => {
                write!(f, "volume file {} is empty", path.display())
            }

            StoreError::Corrupt { offset, reason } => {
                write!(f, "corrupt volume image at offset {}: {}", offset, reason)
            }
        }
    }
}

impl Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for save/load operations
pub type StoreResult<T> = Result<T, StoreError>;
