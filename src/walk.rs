//! Directory traversal for snaptar
//!
//! This module turns a directory tree into lazy, deterministic sequences of
//! files. It is the first stage of both pipelines:
//!
//! - [`SourceWalker`] yields an [`Entry`] for every regular file the archiver
//!   must write, with symbolic links resolved to their targets
//! - [`FileScanner`] yields a [`FileCandidate`] for every regular file the
//!   deduplicator must hash
//!
//! Neither stage touches file contents or makes retention decisions; that is
//! left to the consumer of the iterator.
//!
//! ## Ordering
//!
//! Siblings are visited in file name order, so the same tree always produces
//! the same sequence. The archive member order and the deduplication
//! tie-break both rely on this.
//!
//! ## Symlink Handling
//!
//! The walk itself never follows links. Every visited node is re-resolved
//! with a followed stat before it is classified:
//!
//! - link to a regular file: yielded, carrying the **target's** metadata
//! - link to a directory: skipped, and not descended into
//! - broken link: an error, which aborts the walk
//!
//! Using the link's own metadata instead would make "link to file" and
//! "link to directory" indistinguishable.
//!
//! ## Example
//!
//! ```rust,no_run
//! use snaptar::walk::SourceWalker;
//!
//! # fn main() -> snaptar::Result<()> {
//! let walker = SourceWalker::new("/home/user/project")
//!     .with_exclude_patterns(&["*.tmp".to_string()])?;
//!
//! for entry in walker.entries() {
//!     let entry = entry?;
//!     println!("{} ({} bytes)", entry.member_name(), entry.metadata.size);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnaptarError};
use crate::types::{Entry, EntryMetadata, FileCandidate};
use crate::utils;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Walker producing archive entries for a source tree
#[derive(Debug, Clone)]
pub struct SourceWalker {
    /// Root of the tree; member names are relative to it
    root: PathBuf,
    /// Exact paths never yielded (the archive being written)
    excluded_paths: Vec<PathBuf>,
    /// Glob patterns matched against member names
    exclude_patterns: Option<GlobSet>,
}

impl SourceWalker {
    /// Create a walker over `root` with no exclusions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_paths: Vec::new(),
            exclude_patterns: None,
        }
    }

    /// Never yield the file at `path`
    ///
    /// Used to keep the archive being written out of its own contents when
    /// the target directory lives inside the source tree.
    pub fn with_excluded_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    /// Skip files whose member name matches any of `patterns`
    ///
    /// # Errors
    ///
    /// - [`SnaptarError::InvalidPattern`] if a pattern is not a valid glob
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude_patterns = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| SnaptarError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SnaptarError::InvalidPattern(e.to_string()))?;
        self.exclude_patterns = Some(set);
        Ok(self)
    }

    /// Root of the walk
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily iterate over every archivable entry under the root
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            walker: self,
            inner: WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
        }
    }

    /// Classify one visited node
    ///
    /// Returns `Ok(None)` for nodes that produce no archive entry.
    fn resolve(&self, dent: walkdir::DirEntry) -> Result<Option<Entry>> {
        let path = dent.path();

        if dent.file_type().is_dir() {
            return Ok(None);
        }

        if self.excluded_paths.iter().any(|p| p == path) {
            trace!("Skipping excluded path {:?}", path);
            return Ok(None);
        }

        let is_symlink = dent.path_is_symlink();
        let metadata = fs::metadata(path).map_err(|source| SnaptarError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        if metadata.is_dir() {
            debug!("Skipping symlink to directory {:?}", path);
            return Ok(None);
        }
        if !metadata.is_file() {
            debug!("Skipping special file {:?}", path);
            return Ok(None);
        }

        let relative_path = utils::member_path(path, &self.root)?;

        if let Some(patterns) = &self.exclude_patterns {
            if patterns.is_match(&relative_path) {
                trace!("Skipping {:?} (matches exclude pattern)", relative_path);
                return Ok(None);
            }
        }

        Ok(Some(Entry {
            absolute_path: path.to_path_buf(),
            relative_path,
            metadata: EntryMetadata {
                size: metadata.len(),
                mode: utils::get_permissions(&metadata),
                modified: metadata.modified().map_err(|source| SnaptarError::Metadata {
                    path: path.to_path_buf(),
                    source,
                })?,
                is_symlink,
            },
        }))
    }
}

/// Iterator returned by [`SourceWalker::entries`]
///
/// Yields entries in walk order. After the first error the caller is
/// expected to stop; the archiver always does.
pub struct Entries<'a> {
    walker: &'a SourceWalker,
    inner: walkdir::IntoIter,
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dent = match self.inner.next()? {
                Ok(dent) => dent,
                Err(err) => return Some(Err(walk_error(err, self.walker.root()))),
            };

            match self.walker.resolve(dent) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Scanner producing deduplication candidates for a storage directory
///
/// Only regular files are yielded. Directories and symbolic links are
/// skipped: a link is never hashed through and never deleted.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    recursive: bool,
}

impl FileScanner {
    /// Create a recursive scanner over `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
        }
    }

    /// Limit the scan to the top level of the root when `false`
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Lazily iterate over every regular file under the root
    pub fn candidates(&self) -> Candidates {
        let mut walk = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();
        if !self.recursive {
            walk = walk.max_depth(1);
        }
        Candidates {
            root: self.root.clone(),
            inner: walk.into_iter(),
        }
    }
}

/// Iterator returned by [`FileScanner::candidates`]
pub struct Candidates {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

impl Iterator for Candidates {
    type Item = Result<FileCandidate>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dent = match self.inner.next()? {
                Ok(dent) => dent,
                Err(err) => return Some(Err(walk_error(err, &self.root))),
            };

            let file_type = dent.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                trace!("Skipping non-regular file {:?}", dent.path());
                continue;
            }

            let path = dent.path().to_path_buf();
            let metadata = match dent.metadata() {
                Ok(metadata) => metadata,
                Err(err) => return Some(Err(walk_error(err, &path))),
            };
            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(source) => return Some(Err(SnaptarError::Metadata { path, source })),
            };

            return Some(Ok(FileCandidate {
                path,
                size: metadata.len(),
                modified,
            }));
        }
    }
}

/// Wrap a walkdir error with the path it concerns
fn walk_error(err: walkdir::Error, fallback: &Path) -> SnaptarError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    SnaptarError::Walk { path, source: err }
}
