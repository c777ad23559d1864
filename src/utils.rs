//! Utility functions for snaptar
//!
//! Small helpers shared by the archiver and the deduplicator: permission
//! extraction, archive member naming, time conversion and byte formatting.
//!
//! ## Member Naming
//!
//! Archive member paths are always relative to the walk root and are built
//! from the plain components of the visited path only. A member path is
//! never empty and never `.`. Component bytes are kept as they are, so names
//! that are not valid UTF-8 survive into the archive unchanged.
//!
//! ```rust,ignore
//! use crate::utils::member_path;
//! use std::path::{Path, PathBuf};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let name = member_path(Path::new("/src/a/b/2.txt"), Path::new("/src/a"))?;
//! assert_eq!(name, PathBuf::from("b/2.txt"));
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnaptarError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Get Unix permissions from metadata
#[cfg(unix)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Resolve `path` to an absolute, existing directory
///
/// Symlinks in the path are resolved, so comparisons against paths produced
/// by a walk of the result are exact.
///
/// # Errors
///
/// - [`SnaptarError::PathResolution`] if the path does not exist, cannot be
///   resolved, or is not a directory
pub fn resolve_directory(path: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(path).map_err(|source| SnaptarError::PathResolution {
        path: path.to_path_buf(),
        source,
    })?;

    if !resolved.is_dir() {
        return Err(SnaptarError::PathResolution {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    Ok(resolved)
}

/// Resolve the parent directory of a file path that may not exist yet
///
/// # Errors
///
/// - [`SnaptarError::PathResolution`] if the parent is unusable or `path`
///   has no file name
pub fn resolve_file_path(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| SnaptarError::PathResolution {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(resolve_directory(parent)?.join(file_name))
}

/// Build the archive member path for `path` relative to `base`
///
/// Strips `base` lexically, so a symlink keeps its own location as its name
/// rather than the location of its target.
///
/// # Errors
///
/// - [`SnaptarError::Internal`] if `path` is not under `base`, or equals it
pub fn member_path(path: &Path, base: &Path) -> Result<PathBuf> {
    let relative = path.strip_prefix(base).map_err(|_| {
        SnaptarError::internal(format!("Path {:?} is not relative to {:?}", path, base))
    })?;

    let mut member = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => member.push(part),
            Component::CurDir => {}
            other => {
                return Err(SnaptarError::internal(format!(
                    "Unexpected component {:?} in {:?}",
                    other, relative
                )));
            }
        }
    }

    if member.as_os_str().is_empty() {
        return Err(SnaptarError::internal(format!(
            "Path {:?} has no name relative to {:?}",
            path, base
        )));
    }

    Ok(member)
}

/// Convert a filesystem timestamp into UTC
pub fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Seconds since the Unix epoch, clamped at zero for pre-epoch times
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format bytes in human-readable form
///
/// Uses 1024 as the conversion factor.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
