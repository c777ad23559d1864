//! Archive creation
//!
//! The [`Archiver`] serializes a directory tree into a single tar file. Each
//! regular file reachable from the source root (symbolic links resolved)
//! becomes one member: a GNU header carrying size, mode, modification time
//! and type, followed by the file's content. Directories produce no members.
//!
//! ## Write Modes
//!
//! By default the archive is staged in a temporary file next to its final
//! location and renamed into place once the tar stream is complete. A failed
//! run therefore leaves no archive behind. With [`Archiver::with_atomic`]
//! set to `false` the archive is written in place, and a failure part way
//! through leaves a partial archive; the returned error reports which case
//! occurred through [`SnaptarError::is_partial_archive`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use snaptar::archive::Archiver;
//! use std::path::Path;
//!
//! # fn main() -> snaptar::Result<()> {
//! let summary = Archiver::new()
//!     .with_exclude_patterns(vec!["*.tmp".to_string()])
//!     .create_archive(Path::new("./project"), Path::new("/backups/project.tar"))?;
//! println!("{} files archived", summary.entries_written);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnaptarError};
use crate::types::{ArchiveSummary, Entry, ProgressInfo};
use crate::utils;
use crate::walk::SourceWalker;
use chrono::Utc;
use std::fs::File;
use std::io::{self, BufWriter, Read, Take, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

/// Writes a directory tree into a tar archive
#[derive(Debug, Clone)]
pub struct Archiver {
    /// Stage the archive in a temporary file and rename on success
    atomic: bool,
    /// Glob patterns excluded from the archive
    exclude_patterns: Vec<String>,
}

impl Archiver {
    /// Create an archiver with atomic writes and no exclusions
    pub fn new() -> Self {
        Self {
            atomic: true,
            exclude_patterns: Vec::new(),
        }
    }

    /// Choose between staged (atomic) and in-place writes
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Exclude files whose member name matches any of `patterns`
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Archive every regular file under `source_root` into `archive_path`
    ///
    /// An existing file at `archive_path` is replaced.
    ///
    /// # Errors
    ///
    /// - [`SnaptarError::PathResolution`] if the source root or the archive's
    ///   parent directory is unusable; nothing is written in that case
    /// - [`SnaptarError::Walk`] / [`SnaptarError::Metadata`] if traversal fails
    /// - [`SnaptarError::ArchiveWrite`] if a source file cannot be read or the
    ///   archive cannot be written
    pub fn create_archive(&self, source_root: &Path, archive_path: &Path) -> Result<ArchiveSummary> {
        self.create_archive_with_progress::<fn(ProgressInfo)>(source_root, archive_path, None)
    }

    /// Same as [`Archiver::create_archive`], reporting progress after each entry
    #[instrument(skip(self, progress_callback))]
    pub fn create_archive_with_progress<F>(
        &self,
        source_root: &Path,
        archive_path: &Path,
        mut progress_callback: Option<F>,
    ) -> Result<ArchiveSummary>
    where
        F: FnMut(ProgressInfo),
    {
        let start = Instant::now();
        let source_root = utils::resolve_directory(source_root)?;
        let archive_path = utils::resolve_file_path(archive_path)?;

        info!("Archiving {:?} into {:?}", source_root, archive_path);

        let walker = SourceWalker::new(&source_root)
            .with_exclude_patterns(&self.exclude_patterns)?
            .with_excluded_path(&archive_path);

        let mut progress = |entry: &Entry, processed: usize, bytes: u64| {
            if let Some(callback) = progress_callback.as_mut() {
                callback(ProgressInfo {
                    operation: "Archiving".to_string(),
                    current_item: Some(entry.member_name().into_owned()),
                    processed,
                    bytes_processed: bytes,
                });
            }
        };

        let (entries_written, bytes_written, archive_size) = if self.atomic {
            write_staged(&walker, &archive_path, &mut progress)?
        } else {
            write_in_place(&walker, &archive_path, &mut progress)?
        };

        let summary = ArchiveSummary {
            archive_path,
            entries_written,
            bytes_written,
            archive_size,
            created_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Archive complete in {}ms: {} files, {}",
            summary.duration_ms,
            summary.entries_written,
            utils::format_bytes(summary.bytes_written)
        );

        Ok(summary)
    }
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Archive `source_root` into `archive_path` with default settings
pub fn create_archive(source_root: &Path, archive_path: &Path) -> Result<ArchiveSummary> {
    Archiver::new().create_archive(source_root, archive_path)
}

/// Write into a temporary file in the archive's directory, then rename
fn write_staged<P>(walker: &SourceWalker, archive_path: &Path, progress: &mut P) -> Result<(usize, u64, u64)>
where
    P: FnMut(&Entry, usize, u64),
{
    let parent = archive_path
        .parent()
        .ok_or_else(|| SnaptarError::internal(format!("{:?} has no parent", archive_path)))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".snaptar-").suffix(".tmp");
    // Same mode File::create would give (before umask)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let staged = builder
        .tempfile_in(parent)
        .map_err(|e| SnaptarError::archive_write(archive_path, e))?;
    debug!("Staging archive in {:?}", staged.path());

    let walker = walker.clone().with_excluded_path(staged.path());
    let (entries, bytes) = write_tar(staged.as_file(), &walker, archive_path, progress)?;

    let archive_size = staged
        .as_file()
        .metadata()
        .map_err(|e| SnaptarError::archive_write(archive_path, e))?
        .len();

    staged
        .persist(archive_path)
        .map_err(|e| SnaptarError::archive_write(archive_path, e.error))?;

    Ok((entries, bytes, archive_size))
}

/// Write directly at the destination; failures may leave a partial archive
fn write_in_place<P>(walker: &SourceWalker, archive_path: &Path, progress: &mut P) -> Result<(usize, u64, u64)>
where
    P: FnMut(&Entry, usize, u64),
{
    let file = File::create(archive_path).map_err(|e| SnaptarError::archive_write(archive_path, e))?;
    let (entries, bytes) =
        write_tar(&file, walker, archive_path, progress).map_err(|e| e.into_partial(archive_path))?;

    let archive_size = file
        .metadata()
        .map_err(|e| SnaptarError::archive_write(archive_path, e).into_partial(archive_path))?
        .len();

    Ok((entries, bytes, archive_size))
}

/// Stream every walker entry into `file` as a tar archive
fn write_tar<P>(
    file: &File,
    walker: &SourceWalker,
    archive_path: &Path,
    progress: &mut P,
) -> Result<(usize, u64)>
where
    P: FnMut(&Entry, usize, u64),
{
    let write_err = |e: io::Error| SnaptarError::archive_write(archive_path, e);

    let mut builder = tar::Builder::new(BufWriter::new(file));
    let mut entries_written = 0usize;
    let mut bytes_written = 0u64;

    for entry in walker.entries() {
        let entry = entry?;
        append_entry(&mut builder, &entry)?;

        entries_written += 1;
        bytes_written += entry.metadata.size;
        trace!("Archived {:?} ({} bytes)", entry.relative_path, entry.metadata.size);
        progress(&entry, entries_written, bytes_written);
    }

    builder.finish().map_err(write_err)?;
    let writer = builder.into_inner().map_err(write_err)?;
    writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;

    Ok((entries_written, bytes_written))
}

/// Append one header + content pair
fn append_entry<W: Write>(builder: &mut tar::Builder<W>, entry: &Entry) -> Result<()> {
    let source_err = |e: io::Error| SnaptarError::archive_write(&entry.absolute_path, e);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(entry.metadata.size);
    header.set_mode(entry.metadata.mode);
    header.set_mtime(utils::unix_seconds(entry.metadata.modified));

    let file = File::open(&entry.absolute_path).map_err(source_err)?;
    let content = ExactReader::new(file, entry.metadata.size, entry.absolute_path.clone());

    builder
        .append_data(&mut header, &entry.relative_path, content)
        .map_err(source_err)
}

/// Reader yielding exactly the size recorded in the header
///
/// Bytes appended after the stat are ignored; a file that shrank is an
/// error, since the header already promised more content.
struct ExactReader {
    inner: Take<File>,
    remaining: u64,
    path: PathBuf,
}

impl ExactReader {
    fn new(file: File, size: u64, path: PathBuf) -> Self {
        Self {
            inner: file.take(size),
            remaining: size,
            path,
        }
    }
}

impl Read for ExactReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{:?} shrank by {} bytes while being archived", self.path, self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
