//! Archive file naming
//!
//! Archive names are rendered from a chrono strftime template and a
//! timestamp supplied by the caller. Nothing in this module reads the clock,
//! so names are reproducible in tests.
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use snaptar::naming::{format_archive_name, DEFAULT_NAME_FORMAT};
//!
//! let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
//! let name = format_archive_name(DEFAULT_NAME_FORMAT, &now).unwrap();
//! assert_eq!(name, "workspace-2024-03-09T14:05:00+00:00.tar");
//! ```

use crate::error::{Result, SnaptarError};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

/// Default template: fixed prefix, RFC 3339 timestamp, fixed suffix
pub const DEFAULT_NAME_FORMAT: &str = "workspace-%Y-%m-%dT%H:%M:%S%:z.tar";

/// Render `template` against `now`
///
/// # Errors
///
/// - [`SnaptarError::InvalidNameFormat`] if the template has an unknown
///   specifier, renders to an empty name, to `.` or `..`, or to something
///   containing a path separator
pub fn format_archive_name<Tz>(template: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(SnaptarError::InvalidNameFormat(format!(
            "unrecognized specifier in {:?}",
            template
        )));
    }

    let mut name = String::new();
    write!(name, "{}", now.format_with_items(items.into_iter())).map_err(|_| {
        SnaptarError::InvalidNameFormat(format!("cannot render {:?}", template))
    })?;

    validate_file_name(&name)?;
    Ok(name)
}

/// Full path of the archive for `now` inside `target_dir`
pub fn archive_path<Tz>(target_dir: &Path, template: &str, now: &DateTime<Tz>) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    Ok(target_dir.join(format_archive_name(template, now)?))
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SnaptarError::InvalidNameFormat("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(SnaptarError::InvalidNameFormat(format!("{:?} is not a file name", name)));
    }
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) || name.contains('\0') {
        return Err(SnaptarError::InvalidNameFormat(format!(
            "{:?} contains a path separator",
            name
        )));
    }
    Ok(())
}
