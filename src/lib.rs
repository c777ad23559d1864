//! # Snaptar - timestamped tar snapshots of a directory tree
//!
//! Snaptar captures every regular file below a source directory into a single
//! uncompressed tar archive named after the current time, and can then prune
//! content-identical archives from the target directory.
//!
//! ## Overview
//!
//! A snapshot run has two independent stages:
//! - **Archiving**: walk the source tree in sorted order and write one tar
//!   member per regular file, with paths relative to the source root
//! - **Deduplication**: hash every file in the target directory with SHA-256
//!   and delete redundant copies, keeping the newest one (or, alternatively,
//!   every file identical to the archive just written)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snaptar::{SnapshotBuilder, RetentionPolicy};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = SnapshotBuilder::new()
//!     .delete_duplicates(true)
//!     .retention(RetentionPolicy::NewestWins)
//!     .exclude_patterns(vec!["*.tmp".to_string()])
//!     .build(Path::new("./workspace"), Path::new("./backups"))?;
//!
//! let outcome = snapshot.run()?;
//! println!(
//!     "archived {} files into {:?}",
//!     outcome.archive.entries_written, outcome.archive.archive_path
//! );
//! if let Some(report) = outcome.dedup {
//!     println!("removed {} duplicates", report.deleted_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the Stages Directly
//!
//! ```rust,no_run
//! use snaptar::{create_archive, deduplicate};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let summary = create_archive(Path::new("./src"), Path::new("./backups/src.tar"))?;
//! println!("{} bytes archived", summary.bytes_written);
//!
//! let deleted = deduplicate(Path::new("./backups"))?;
//! println!("{} duplicates removed", deleted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Archive Format
//!
//! - Plain ustar/GNU tar, no compression
//! - Member names use `/` separators and never start with `/` or `./`
//! - Only regular files are stored; directories are implied by member paths
//! - Symlinks are followed: the member holds the target's content under the
//!   link's own name; symlinks to directories are skipped
//! - Permission bits and modification time come from the followed target
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnaptarError>`. The first failure aborts
//! the operation. An archive written in place that fails midway is reported
//! as [`SnaptarError::PartialArchive`]; the default staged write never leaves
//! a partial file at the final path.
//!
//! ## Module Organization
//!
//! - [`archive`]: tar archive creation
//! - [`dedup`]: checksum index and duplicate removal
//! - [`naming`]: timestamped archive file names
//! - [`snapshot`]: the combined archive-then-deduplicate run
//! - [`walk`]: sorted directory traversal
//! - [`checksum`]: streaming SHA-256
//! - [`types`]: common types and data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod archive;
pub mod checksum;
pub mod dedup;
pub mod error;
pub mod naming;
pub mod snapshot;
pub mod types;
pub mod walk;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use archive::{create_archive, Archiver};
pub use checksum::Checksum;
pub use dedup::{deduplicate, ChecksumIndex, Deduplicator, Retention};
pub use error::{Result, SnaptarError};
pub use naming::{format_archive_name, DEFAULT_NAME_FORMAT};
pub use snapshot::{Snapshot, SnapshotBuilder, SnapshotConfig};
pub use types::*;
