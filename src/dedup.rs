//! Content-addressed duplicate removal
//!
//! The [`Deduplicator`] hashes every regular file in a storage directory and
//! removes files whose content duplicates another file's. It runs as a two
//! stage pipeline:
//!
//! 1. [`FileScanner`] lazily yields candidates (path, size, modification
//!    time) in sorted walk order
//! 2. each candidate is hashed and offered to a [`ChecksumIndex`], which
//!    returns a [`Retention`] decision that is executed immediately
//!
//! ## Policies
//!
//! - [`RetentionPolicy::NewestWins`] (default): among files with equal
//!   content, the most recently modified one survives. When modification
//!   times are equal the file met first in the walk survives, so repeated
//!   runs always keep the same file.
//! - [`RetentionPolicy::MatchArchive`]: every file whose content equals a
//!   reference archive is removed. The reference itself is never removed.
//!
//! Protected paths ([`Deduplicator::protect`]) are never removed under
//! either policy.
//!
//! ## Failure Handling
//!
//! The first read or delete failure aborts the pass. Files removed before
//! the failure stay removed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use snaptar::dedup::Deduplicator;
//! use std::path::Path;
//!
//! # fn main() -> snaptar::Result<()> {
//! let report = Deduplicator::new()
//!     .protect("/backups/workspace-latest.tar")
//!     .run(Path::new("/backups"))?;
//! println!("removed {} duplicates", report.deleted_count());
//! # Ok(())
//! # }
//! ```

use crate::checksum::{self, Checksum};
use crate::error::{Result, SnaptarError};
use crate::types::{DedupReport, FileCandidate, RetentionPolicy};
use crate::utils;
use crate::walk::FileScanner;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

/// Decision taken when a file is offered to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retention {
    /// Nothing to remove
    Keep,
    /// `loser` duplicates `survivor` and must be removed
    Delete {
        /// File to remove
        loser: FileCandidate,
        /// Representative kept for this checksum
        survivor: PathBuf,
    },
}

#[derive(Debug, Clone)]
struct Representative {
    candidate: FileCandidate,
    protected: bool,
}

/// Map from content checksum to the file kept for it
///
/// Lives for one deduplication pass and is rebuilt from scratch on every
/// run; nothing is persisted.
#[derive(Debug, Default)]
pub struct ChecksumIndex {
    representatives: HashMap<Checksum, Representative>,
}

impl ChecksumIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `candidate` with content `checksum` and decide who stays
    ///
    /// Newest-wins: the later modification time survives; on a tie the
    /// incumbent survives. A protected file always beats an unprotected one,
    /// and two protected files are both kept.
    pub fn offer(&mut self, checksum: Checksum, candidate: FileCandidate, protected: bool) -> Retention {
        match self.representatives.entry(checksum) {
            MapEntry::Vacant(slot) => {
                slot.insert(Representative { candidate, protected });
                Retention::Keep
            }
            MapEntry::Occupied(mut slot) => {
                let incumbent = slot.get();
                let newcomer_wins = match (incumbent.protected, protected) {
                    (true, true) => return Retention::Keep,
                    (true, false) => false,
                    (false, true) => true,
                    (false, false) => candidate.modified > incumbent.candidate.modified,
                };

                if newcomer_wins {
                    let survivor = candidate.path.clone();
                    let evicted = slot.insert(Representative { candidate, protected });
                    Retention::Delete {
                        loser: evicted.candidate,
                        survivor,
                    }
                } else {
                    Retention::Delete {
                        loser: candidate,
                        survivor: incumbent.candidate.path.clone(),
                    }
                }
            }
        }
    }

    /// Representative currently kept for `checksum`
    pub fn representative(&self, checksum: &Checksum) -> Option<&FileCandidate> {
        self.representatives.get(checksum).map(|r| &r.candidate)
    }

    /// Number of distinct checksums seen
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    /// Whether no file has been offered yet
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }
}

/// Removes content duplicates from a directory
#[derive(Debug, Clone)]
pub struct Deduplicator {
    policy: RetentionPolicy,
    reference: Option<PathBuf>,
    protected: Vec<PathBuf>,
    recursive: bool,
    dry_run: bool,
}

impl Deduplicator {
    /// Newest-wins deduplicator over the whole directory tree
    pub fn new() -> Self {
        Self {
            policy: RetentionPolicy::NewestWins,
            reference: None,
            protected: Vec::new(),
            recursive: true,
            dry_run: false,
        }
    }

    /// Deduplicator removing every copy of `archive` except `archive` itself
    pub fn matching_archive(archive: impl Into<PathBuf>) -> Self {
        Self::new()
            .with_policy(RetentionPolicy::MatchArchive)
            .with_reference(archive)
    }

    /// Select the retention policy
    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the reference archive used by [`RetentionPolicy::MatchArchive`]
    ///
    /// The reference is also protected.
    pub fn with_reference(mut self, archive: impl Into<PathBuf>) -> Self {
        let archive = archive.into();
        self.protected.push(archive.clone());
        self.reference = Some(archive);
        self
    }

    /// Never delete the file at `path`
    pub fn protect(mut self, path: impl Into<PathBuf>) -> Self {
        self.protected.push(path.into());
        self
    }

    /// Scan subdirectories too (default `true`)
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Report what would be deleted without deleting it
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one deduplication pass over `root`
    ///
    /// # Errors
    ///
    /// - [`SnaptarError::PathResolution`] if `root` (or the reference
    ///   archive) does not exist
    /// - [`SnaptarError::InvalidConfiguration`] if
    ///   [`RetentionPolicy::MatchArchive`] is selected without a reference
    /// - [`SnaptarError::Walk`] if traversal fails
    /// - [`SnaptarError::Checksum`] if a file cannot be read
    /// - [`SnaptarError::Deletion`] if a duplicate cannot be removed
    #[instrument(skip(self), fields(policy = ?self.policy, dry_run = self.dry_run))]
    pub fn run(&self, root: &Path) -> Result<DedupReport> {
        let start = Instant::now();
        let root = utils::resolve_directory(root)?;
        let protected: HashSet<PathBuf> = self
            .protected
            .iter()
            .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();

        info!("Deduplicating {:?}", root);

        let mut report = DedupReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        match self.policy {
            RetentionPolicy::NewestWins => self.newest_wins(&root, &protected, &mut report)?,
            RetentionPolicy::MatchArchive => self.match_archive(&root, &protected, &mut report)?,
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Deduplication complete in {}ms: {} files scanned, {} {}, {} reclaimed",
            report.duration_ms,
            report.files_scanned,
            report.deleted_count(),
            if self.dry_run { "would be deleted" } else { "deleted" },
            utils::format_bytes(report.bytes_reclaimed)
        );

        Ok(report)
    }

    fn newest_wins(&self, root: &Path, protected: &HashSet<PathBuf>, report: &mut DedupReport) -> Result<()> {
        let mut index = ChecksumIndex::new();

        for candidate in FileScanner::new(root).with_recursive(self.recursive).candidates() {
            let candidate = candidate?;
            let checksum = checksum::checksum_file(&candidate.path)?;
            report.files_scanned += 1;
            trace!("{} {:?}", checksum.short(), candidate.path);

            let is_protected = protected.contains(&candidate.path);
            if let Retention::Delete { loser, survivor } = index.offer(checksum, candidate, is_protected) {
                debug!(
                    "{:?} (modified {}) duplicates {:?}",
                    loser.path,
                    utils::to_utc(loser.modified),
                    survivor
                );
                self.remove(loser, report)?;
            }
        }

        report.unique_checksums = index.len();
        Ok(())
    }

    fn match_archive(&self, root: &Path, protected: &HashSet<PathBuf>, report: &mut DedupReport) -> Result<()> {
        let reference = self.reference.as_ref().ok_or_else(|| {
            SnaptarError::InvalidConfiguration("match-archive policy requires a reference archive".to_string())
        })?;
        let reference = utils::resolve_file_path(reference)?;
        let reference_sum = checksum::checksum_file(&reference)?;
        debug!("Reference {:?} has checksum {}", reference, reference_sum.short());

        let mut seen = HashSet::new();
        seen.insert(reference_sum);

        for candidate in FileScanner::new(root).with_recursive(self.recursive).candidates() {
            let candidate = candidate?;
            if candidate.path == reference {
                continue;
            }

            let checksum = checksum::checksum_file(&candidate.path)?;
            report.files_scanned += 1;
            seen.insert(checksum);

            if checksum == reference_sum && !protected.contains(&candidate.path) {
                debug!("{:?} duplicates reference {:?}", candidate.path, reference);
                self.remove(candidate, report)?;
            }
        }

        report.unique_checksums = seen.len();
        Ok(())
    }

    fn remove(&self, loser: FileCandidate, report: &mut DedupReport) -> Result<()> {
        if self.dry_run {
            info!("Would delete duplicate {:?}", loser.path);
        } else {
            fs::remove_file(&loser.path).map_err(|source| SnaptarError::Deletion {
                path: loser.path.clone(),
                source,
            })?;
            info!("Deleted duplicate {:?}", loser.path);
        }

        report.bytes_reclaimed += loser.size;
        report.deleted.push(loser.path);
        Ok(())
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-wins deduplication of `root`, returning the number of files deleted
pub fn deduplicate(root: &Path) -> Result<usize> {
    Deduplicator::new().run(root).map(|report| report.deleted_count())
}
