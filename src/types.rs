//! Core data types used throughout the snaptar library
//!
//! This module contains the data structures shared by the archiver, the
//! deduplicator and the snapshot orchestration.
//!
//! ## Overview
//!
//! - **Walk state**: [`Entry`], [`EntryMetadata`], [`FileCandidate`] - files visited
//!   during a traversal
//! - **Results**: [`ArchiveSummary`], [`DedupReport`], [`SnapshotOutcome`] - what an
//!   operation did
//! - **Configuration**: [`RetentionPolicy`] - how duplicates are resolved
//! - **Progress**: [`ProgressInfo`] - callbacks during long operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::SystemTime;

/// A regular file visited while walking the source tree
///
/// One `Entry` becomes exactly one archive member. Entries only exist for
/// nodes that resolve to regular files; directories never produce one.
///
/// # Examples
///
/// ```rust
/// # use snaptar::types::{Entry, EntryMetadata};
/// # use std::path::PathBuf;
/// # use std::time::SystemTime;
/// let entry = Entry {
///     absolute_path: PathBuf::from("/home/user/project/src/main.rs"),
///     relative_path: PathBuf::from("src/main.rs"),
///     metadata: EntryMetadata {
///         size: 1024,
///         mode: 0o644,
///         modified: SystemTime::UNIX_EPOCH,
///         is_symlink: false,
///     },
/// };
/// assert_eq!(entry.member_name(), "src/main.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path of the visited node (the link itself for symlinks)
    pub absolute_path: PathBuf,
    /// Path relative to the walk root; written to the archive byte for byte
    pub relative_path: PathBuf,
    /// Metadata of the resolved target
    pub metadata: EntryMetadata,
}

impl Entry {
    /// Member name for log lines and progress reports
    ///
    /// Lossy for names that are not valid UTF-8; the archive itself always
    /// receives the exact bytes of [`Entry::relative_path`].
    pub fn member_name(&self) -> Cow<'_, str> {
        self.relative_path.to_string_lossy()
    }
}

/// Metadata recorded in an archive header
///
/// Size, mode and modification time always describe the symlink *target*
/// when the visited node is a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// File size in bytes
    pub size: u64,
    /// Unix permission bits
    pub mode: u32,
    /// Last modification time
    pub modified: SystemTime,
    /// Whether the visited node was a symbolic link
    pub is_symlink: bool,
}

/// A file visited by the deduplication scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path of the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

/// How content-identical files are resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Keep the most recently modified copy of every checksum
    ///
    /// Equal modification times keep the file seen first in the sorted walk.
    #[default]
    NewestWins,
    /// Delete every file whose content equals the reference archive
    ///
    /// The reference archive itself is never deleted.
    MatchArchive,
}

/// Summary of a completed archive write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    /// Final location of the archive
    pub archive_path: PathBuf,
    /// Number of members written
    pub entries_written: usize,
    /// Total content bytes copied into the archive
    pub bytes_written: u64,
    /// Size of the finished archive file
    pub archive_size: u64,
    /// When the archive write completed
    pub created_at: DateTime<Utc>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Statistics from a deduplication pass
///
/// # Examples
///
/// ```rust
/// # use snaptar::types::DedupReport;
/// let report = DedupReport::default();
/// assert!(!report.has_deletions());
/// assert_eq!(report.deleted_count(), 0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupReport {
    /// Number of regular files hashed
    pub files_scanned: usize,
    /// Number of distinct checksums seen
    pub unique_checksums: usize,
    /// Files removed (or that would be removed in a dry run), in decision order
    pub deleted: Vec<PathBuf>,
    /// Bytes freed by the deletions
    pub bytes_reclaimed: u64,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl DedupReport {
    /// Number of files deleted
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Whether the pass removed anything
    pub fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }
}

/// Result of a full snapshot run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOutcome {
    /// The archive that was written
    pub archive: ArchiveSummary,
    /// Deduplication report, if deduplication was enabled
    pub dedup: Option<DedupReport>,
}

/// Progress information for long-running operations
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current operation
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Number of items processed
    pub processed: usize,
    /// Bytes processed so far
    pub bytes_processed: u64,
}
