//! Error types for the snaptar library
//!
//! This module defines all error types that can occur while archiving a
//! directory tree or pruning duplicate archives. Every variant carries the
//! path it concerns and, where one exists, the underlying cause as its
//! `source`, so callers can print the whole cause chain.
//!
//! ## Taxonomy
//!
//! - [`SnaptarError::PathResolution`]: a supplied path is unusable, reported
//!   before any I/O happens
//! - [`SnaptarError::ArchiveWrite`]: creating or writing the archive failed
//! - [`SnaptarError::PartialArchive`]: an in-place write failed after the
//!   archive file was created; wraps the cause
//! - [`SnaptarError::Walk`]: traversal failed (permission denied, vanished
//!   file)
//! - [`SnaptarError::Metadata`]: a visited node could not be stat'ed through
//!   its links (broken symlink)
//! - [`SnaptarError::Checksum`]: a file could not be read while hashing
//! - [`SnaptarError::Deletion`]: a duplicate could not be removed
//!
//! None of these are retried. The first failure aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snaptar library
pub type Result<T> = std::result::Result<T, SnaptarError>;

/// Main error type for all snaptar operations
#[derive(Debug, Error)]
pub enum SnaptarError {
    /// A supplied path cannot be made absolute, does not exist, or is not a directory
    #[error("cannot resolve path {path:?}")]
    PathResolution {
        /// The path as supplied
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Failure opening, writing, finishing or persisting the archive
    #[error("error writing archive {path:?}")]
    ArchiveWrite {
        /// Archive being written, or the source file being copied into it
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// A run failed after the archive was created in place
    ///
    /// The file at `path` holds whatever was written before the failure.
    #[error("partial archive left at {path:?}")]
    PartialArchive {
        /// Archive left on disk
        path: PathBuf,
        /// The failure that interrupted the write
        #[source]
        source: Box<SnaptarError>,
    },

    /// Failure statting or descending into a path during traversal
    #[error("error walking {path:?}")]
    Walk {
        /// Path where the walk failed
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: walkdir::Error,
    },

    /// Failure resolving the metadata of a visited entry
    #[error("error reading metadata of {path:?}")]
    Metadata {
        /// Entry whose metadata could not be read
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Failure reading a file while computing its checksum
    #[error("error generating checksum of {path:?}")]
    Checksum {
        /// File being hashed
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Failure removing a duplicate file
    #[error("error deleting file {path:?}")]
    Deletion {
        /// File that could not be removed
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Archive naming template is unusable
    #[error("invalid archive name format: {0}")]
    InvalidNameFormat(String),

    /// Exclude pattern parsing error
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O errors not tied to a specific stage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("internal error: {0}")]
    Internal(String),
}

impl SnaptarError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnaptarError::Internal(msg.into())
    }

    /// Create an archive write error
    pub fn archive_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnaptarError::ArchiveWrite {
            path: path.into(),
            source,
        }
    }

    /// Wrap `self` as the cause of a partial archive at `path`
    pub fn into_partial(self, path: impl Into<PathBuf>) -> Self {
        SnaptarError::PartialArchive {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error left a partially written archive on disk
    ///
    /// Staged (atomic) writes never leave a partial archive behind; in-place
    /// writes that fail after creating the file always do.
    pub fn is_partial_archive(&self) -> bool {
        matches!(self, SnaptarError::PartialArchive { .. })
    }

    /// Check if this error happened before any file was touched
    pub fn is_before_io(&self) -> bool {
        matches!(
            self,
            SnaptarError::PathResolution { .. }
                | SnaptarError::InvalidNameFormat(_)
                | SnaptarError::InvalidPattern(_)
                | SnaptarError::InvalidConfiguration(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnaptarError::PathResolution { path, .. } => {
                format!("Path {:?} does not exist or is not a directory. Check --src and --target.", path)
            }
            SnaptarError::PartialArchive { path, .. } => {
                format!(
                    "Writing the archive failed at {:?}. A partial archive may remain on disk; \
                     remove it or rerun without --no-atomic.",
                    path
                )
            }
            SnaptarError::InvalidNameFormat(msg) => {
                format!("Archive name format is invalid ({}). Use chrono strftime specifiers, e.g. %Y-%m-%d.", msg)
            }
            _ => self.to_string(),
        }
    }
}
