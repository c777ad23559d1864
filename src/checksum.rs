//! Content checksums
//!
//! Files are identified by the SHA-256 digest of their full content. Files
//! are streamed through a fixed buffer, so hashing a large archive never
//! loads it into memory.

use crate::error::{Result, SnaptarError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer size used while hashing
const BUFFER_SIZE: usize = 8192;

/// SHA-256 digest of a file's content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex encoding (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short())
    }
}

/// Hash everything readable from `reader`
pub fn checksum_reader<R: Read>(mut reader: R) -> std::io::Result<Checksum> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Checksum(hasher.finalize().into()))
}

/// Hash the content of the file at `path`
///
/// The file is opened, read once from start to end, and closed before this
/// returns.
///
/// # Errors
///
/// - [`SnaptarError::Checksum`] if the file cannot be opened or read
pub fn checksum_file(path: &Path) -> Result<Checksum> {
    let file = File::open(path).map_err(|source| SnaptarError::Checksum {
        path: path.to_path_buf(),
        source,
    })?;
    checksum_reader(file).map_err(|source| SnaptarError::Checksum {
        path: path.to_path_buf(),
        source,
    })
}
