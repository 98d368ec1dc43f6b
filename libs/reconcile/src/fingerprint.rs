//! Content fingerprints for change detection.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced while fingerprinting.
#[derive(Debug, Error)]
#[error("failed to read {}: {source}", path.display())]
pub struct FingerprintError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Hex-encoded SHA-256 digest of a file's raw bytes.
///
/// The encoding is bare lowercase hex (64 characters) so that state files
/// written by earlier releases compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the hash of an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a recorded hash string.
    pub fn matches(&self, recorded: Option<&str>) -> bool {
        recorded == Some(self.0.as_str())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Read the file at `path` and fingerprint exactly the bytes read.
///
/// Callers push the returned bytes, so the recorded hash always describes
/// the code that was sent even if the file changes mid-run.
pub fn read_fingerprinted(path: &Path) -> Result<(Vec<u8>, ContentHash), FingerprintError> {
    let bytes = std::fs::read(path).map_err(|source| FingerprintError {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = ContentHash::of_bytes(&bytes);
    Ok((bytes, hash))
}
