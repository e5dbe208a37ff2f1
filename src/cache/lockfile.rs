//! Lockfile hashing for cache metadata
//!
//! Cache entries are keyed by target triple only. The Cargo.lock hash is
//! recorded alongside so `cache info` can tell whether an entry was built
//! from the current dependency set.

use crate::error::{ShipyardError, ShipyardResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lockfile that pins the project's dependency graph
pub const LOCKFILE: &str = "Cargo.lock";

/// Information about a detected lockfile
#[derive(Debug, Clone)]
pub struct LockfileInfo {
    /// Path to the lockfile
    pub path: PathBuf,
    /// SHA256 hash of the lockfile contents (first 12 chars)
    pub hash: String,
}

/// Hash a file's contents using SHA256, returning first 12 hex chars
fn hash_file_contents(path: &Path) -> ShipyardResult<String> {
    let contents = fs::read(path).map_err(|e| ShipyardError::Io {
        context: format!("reading lockfile {}", path.display()),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let result = hasher.finalize();

    Ok(hex::encode(&result[..6]))
}

/// Detect the project's Cargo.lock, if any
pub fn detect_lockfile(project_dir: &Path) -> ShipyardResult<Option<LockfileInfo>> {
    let path = project_dir.join(LOCKFILE);
    if !path.is_file() {
        debug!("No {} in {}", LOCKFILE, project_dir.display());
        return Ok(None);
    }

    let hash = hash_file_contents(&path)?;
    debug!("Found {} (hash {})", path.display(), hash);
    Ok(Some(LockfileInfo { path, hash }))
}
