//! Snapshot orchestration
//!
//! A [`Snapshot`] ties the pieces together the way the command line runs
//! them: resolve the source and target directories, name a new archive from
//! the current time, archive the source into the target, and optionally
//! prune duplicate archives from the target.
//!
//! The only state shared between the archive step and the deduplication
//! step is the path of the new archive, which is always protected from
//! deletion.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snaptar::SnapshotBuilder;
//! use std::path::Path;
//!
//! # fn main() -> snaptar::Result<()> {
//! let snapshot = SnapshotBuilder::new()
//!     .delete_duplicates(true)
//!     .build(Path::new("./workspace"), Path::new("/backups"))?;
//!
//! let outcome = snapshot.run()?;
//! println!("wrote {:?}", outcome.archive.archive_path);
//! # Ok(())
//! # }
//! ```
//!
//! Runs can be pinned to a fixed time, which makes archive names
//! predictable:
//!
//! ```rust,no_run
//! # use snaptar::SnapshotBuilder;
//! # use std::path::Path;
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> snaptar::Result<()> {
//! # let snapshot = SnapshotBuilder::new().build(Path::new("."), Path::new("/tmp"))?;
//! let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
//! let outcome = snapshot.run_at(&now)?;
//! assert!(outcome.archive.archive_path.ends_with("workspace-2024-05-01T12:00:00+00:00.tar"));
//! # Ok(())
//! # }
//! ```

use crate::archive::Archiver;
use crate::dedup::Deduplicator;
use crate::error::{Result, SnaptarError};
use crate::naming::{self, DEFAULT_NAME_FORMAT};
use crate::types::{ProgressInfo, RetentionPolicy, SnapshotOutcome};
use crate::utils;
use crate::walk::SourceWalker;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Settings for a snapshot run
///
/// Every field has a default, so a JSON file only needs the keys it changes:
///
/// ```rust
/// # use snaptar::SnapshotConfig;
/// let config: SnapshotConfig = serde_json::from_str(r#"{ "delete_duplicates": true }"#).unwrap();
/// assert!(config.delete_duplicates);
/// assert!(config.atomic);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// strftime template for the archive file name
    pub name_format: String,
    /// Run the deduplicator after archiving
    pub delete_duplicates: bool,
    /// How duplicates are resolved
    pub retention: RetentionPolicy,
    /// Report duplicates without deleting them
    pub dry_run: bool,
    /// Stage the archive and rename it into place
    pub atomic: bool,
    /// Glob patterns excluded from the archive
    pub exclude_patterns: Vec<String>,
    /// Deduplicate subdirectories of the target too
    pub recursive_dedup: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            name_format: DEFAULT_NAME_FORMAT.to_string(),
            delete_duplicates: false,
            retention: RetentionPolicy::NewestWins,
            dry_run: false,
            atomic: true,
            exclude_patterns: Vec::new(),
            recursive_dedup: true,
        }
    }
}

impl SnapshotConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SnapshotConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check the name template and exclude patterns without touching disk
    pub fn validate(&self) -> Result<()> {
        naming::format_archive_name(&self.name_format, &DateTime::<Utc>::UNIX_EPOCH)?;
        SourceWalker::new(".").with_exclude_patterns(&self.exclude_patterns)?;
        Ok(())
    }
}

/// Builder for [`Snapshot`]
///
/// # Default Values
///
/// - `name_format`: [`DEFAULT_NAME_FORMAT`]
/// - `delete_duplicates`: false
/// - `retention`: [`RetentionPolicy::NewestWins`]
/// - `dry_run`: false
/// - `atomic`: true
/// - `exclude_patterns`: empty
/// - `recursive_dedup`: true
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    config: SnapshotConfig,
}

impl SnapshotBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: SnapshotConfig) -> Self {
        Self { config }
    }

    /// Set the archive name template
    pub fn name_format(mut self, template: impl Into<String>) -> Self {
        self.config.name_format = template.into();
        self
    }

    /// Enable or disable the deduplication pass
    pub fn delete_duplicates(mut self, enabled: bool) -> Self {
        self.config.delete_duplicates = enabled;
        self
    }

    /// Set the retention policy
    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.config.retention = policy;
        self
    }

    /// Report duplicates without deleting them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Stage the archive in a temporary file (default) or write it in place
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.config.atomic = atomic;
        self
    }

    /// Exclude matching files from the archive
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Deduplicate subdirectories of the target too
    pub fn recursive_dedup(mut self, recursive: bool) -> Self {
        self.config.recursive_dedup = recursive;
        self
    }

    /// Resolve both directories and validate the settings
    ///
    /// Nothing is written by this call.
    ///
    /// # Errors
    ///
    /// - [`SnaptarError::PathResolution`] if either path is missing or not a
    ///   directory
    /// - [`SnaptarError::InvalidNameFormat`] / [`SnaptarError::InvalidPattern`]
    ///   for bad settings
    /// - [`SnaptarError::InvalidConfiguration`] if deduplicating the target
    ///   would reach into the source tree
    pub fn build(self, source: &Path, target: &Path) -> Result<Snapshot> {
        let source = utils::resolve_directory(source)?;
        let target = utils::resolve_directory(target)?;
        self.config.validate()?;

        if self.config.delete_duplicates && source.starts_with(&target) {
            let reaches_source = source == target || self.config.recursive_dedup;
            if reaches_source {
                return Err(SnaptarError::InvalidConfiguration(format!(
                    "source {:?} lies inside target {:?}; deduplication would delete source files",
                    source, target
                )));
            }
        }

        Ok(Snapshot {
            source,
            target,
            config: self.config,
        })
    }
}

/// A configured snapshot of one source directory into one target directory
#[derive(Debug, Clone)]
pub struct Snapshot {
    source: PathBuf,
    target: PathBuf,
    config: SnapshotConfig,
}

impl Snapshot {
    /// Resolved source directory
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Resolved target directory
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Active settings
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Run the snapshot, naming the archive after the local wall-clock time
    pub fn run(&self) -> Result<SnapshotOutcome> {
        self.run_at(&Local::now())
    }

    /// Run the snapshot, naming the archive after `now`
    pub fn run_at<Tz>(&self, now: &DateTime<Tz>) -> Result<SnapshotOutcome>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.run_at_with_progress::<Tz, fn(ProgressInfo)>(now, None)
    }

    /// Run the snapshot, reporting archive progress through `progress_callback`
    #[instrument(skip_all, fields(source = ?self.source, target = ?self.target))]
    pub fn run_at_with_progress<Tz, F>(&self, now: &DateTime<Tz>, progress_callback: Option<F>) -> Result<SnapshotOutcome>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
        F: FnMut(ProgressInfo),
    {
        let archive_path = naming::archive_path(&self.target, &self.config.name_format, now)?;

        let archive = Archiver::new()
            .with_atomic(self.config.atomic)
            .with_exclude_patterns(self.config.exclude_patterns.clone())
            .create_archive_with_progress(&self.source, &archive_path, progress_callback)?;

        let dedup = if self.config.delete_duplicates {
            let mut deduplicator = Deduplicator::new()
                .with_policy(self.config.retention.clone())
                .with_recursive(self.config.recursive_dedup)
                .with_dry_run(self.config.dry_run)
                .protect(&archive.archive_path);
            if self.config.retention == RetentionPolicy::MatchArchive {
                deduplicator = deduplicator.with_reference(&archive.archive_path);
            }
            Some(deduplicator.run(&self.target)?)
        } else {
            None
        };

        info!("Snapshot written to {:?}", archive.archive_path);
        Ok(SnapshotOutcome { archive, dedup })
    }
}
