//! Filesystem-backed build cache keyed by target triple
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<key>/entry.json     metadata
//! <root>/<key>/payload/...    saved directories, relative to the project
//! ```

use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::TargetTriple;
use crate::pipeline::stage::Profile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENTRY_FILE: &str = "entry.json";
const PAYLOAD_DIR: &str = "payload";

const VERIFY_PREFIX: &str = "verify-";

/// Cache key. One namespace per target triple, plus a separate namespace
/// for the debug build on the reference target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a release build of a target triple
    pub fn for_target(target: &TargetTriple) -> Self {
        Self(target.as_str().to_string())
    }

    /// Key for the verify build on the reference target
    pub fn for_verify(reference: &TargetTriple) -> Self {
        Self(format!("{}{}", VERIFY_PREFIX, reference))
    }

    /// Parse a key typed by a user: a triple, optionally `verify-` prefixed
    pub fn parse(s: &str) -> ShipyardResult<Self> {
        let (verify, triple) = match s.strip_prefix(VERIFY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let target = TargetTriple::parse(triple)
            .map_err(|_| ShipyardError::CacheKeyInvalid(s.to_string()))?;
        Ok(if verify {
            Self::for_verify(&target)
        } else {
            Self::for_target(&target)
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directories that make up a cache payload, relative to a project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePayload {
    pub paths: Vec<PathBuf>,
}

impl CachePayload {
    /// Compiled dependency directories cargo writes for a build.
    /// Builds without `--target` use `target/<profile>`.
    pub fn for_build(target: Option<&TargetTriple>, profile: Profile) -> Self {
        let mut base = PathBuf::from("target");
        if let Some(t) = target {
            base.push(t.as_str());
        }
        base.push(profile.to_string());
        Self {
            paths: ["deps", "build", ".fingerprint"]
                .iter()
                .map(|d| base.join(d))
                .collect(),
        }
    }
}

/// Metadata about a saved cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Cargo.lock hash at save time
    pub lock_hash: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub paths: Vec<PathBuf>,
}

impl CacheEntry {
    /// Check if this entry was saved more than `days` ago
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.saved_at < cutoff
    }
}

/// Keyed cache of build dependencies
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Copy a saved payload into `project_dir`. `None` on a miss.
    async fn restore(&self, key: &CacheKey, project_dir: &Path)
        -> ShipyardResult<Option<CacheEntry>>;

    /// Save `payload` from `project_dir` under `key`, replacing any old entry
    async fn save(
        &self,
        key: &CacheKey,
        project_dir: &Path,
        payload: &CachePayload,
        lock_hash: Option<String>,
    ) -> ShipyardResult<CacheEntry>;

    /// All saved entries
    async fn list(&self) -> ShipyardResult<Vec<CacheEntry>>;

    /// Delete an entry; returns whether it existed
    async fn remove(&self, key: &CacheKey) -> ShipyardResult<bool>;
}

/// Cache store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn restore(
        &self,
        key: &CacheKey,
        project_dir: &Path,
    ) -> ShipyardResult<Option<CacheEntry>> {
        let dir = self.entry_dir(key);
        let Some(entry) = read_entry(&dir).await? else {
            debug!("Cache miss for {}", key);
            return Ok(None);
        };

        let payload = dir.join(PAYLOAD_DIR);
        let dest = project_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if payload.exists() {
                copy_tree(&payload, &dest)
            } else {
                Ok(0)
            }
        })
        .await
            .map_err(|e| ShipyardError::Internal(format!("cache restore task failed: {}", e)))?
            .map_err(|e| ShipyardError::io(format!("restoring cache {}", key), e))?;

        info!("Restored cache {} ({})", key, format_bytes(entry.size_bytes));
        Ok(Some(entry))
    }

    async fn save(
        &self,
        key: &CacheKey,
        project_dir: &Path,
        payload: &CachePayload,
        lock_hash: Option<String>,
    ) -> ShipyardResult<CacheEntry> {
        let final_dir = self.entry_dir(key);
        let staging = self
            .root
            .join(format!(".{}.{}", key, uuid::Uuid::new_v4().simple()));

        let project = project_dir.to_path_buf();
        let paths = payload.paths.clone();
        let staging_payload = staging.join(PAYLOAD_DIR);
        let size_bytes = tokio::task::spawn_blocking(move || -> io::Result<u64> {
            fs::create_dir_all(&staging_payload)?;
            let mut total = 0;
            for rel in &paths {
                let src = project.join(rel);
                if src.exists() {
                    total += copy_tree(&src, &staging_payload.join(rel))?;
                }
            }
            Ok(total)
        })
        .await
        .map_err(|e| ShipyardError::Internal(format!("cache save task failed: {}", e)))?
        .map_err(|e| ShipyardError::CacheSave {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let entry = CacheEntry {
            key: key.clone(),
            lock_hash,
            saved_at: Utc::now(),
            size_bytes,
            paths: payload.paths.clone(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        tokio::fs::write(staging.join(ENTRY_FILE), json)
            .await
            .map_err(|e| ShipyardError::io(format!("writing cache metadata for {}", key), e))?;

        if final_dir.exists() {
            tokio::fs::remove_dir_all(&final_dir)
                .await
                .map_err(|e| ShipyardError::io(format!("replacing cache {}", key), e))?;
        }
        tokio::fs::rename(&staging, &final_dir)
            .await
            .map_err(|e| ShipyardError::CacheSave {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        info!("Saved cache {} ({})", key, format_bytes(size_bytes));
        Ok(entry)
    }

    async fn list(&self) -> ShipyardResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(ShipyardError::io("reading cache directory", e)),
        };

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| ShipyardError::io("reading cache directory", e))?
        {
            if item.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if let Some(entry) = read_entry(&item.path()).await? {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(entries)
    }

    async fn remove(&self, key: &CacheKey) -> ShipyardResult<bool> {
        let dir = self.entry_dir(key);
        if !dir.exists() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| ShipyardError::io(format!("removing cache {}", key), e))?;
        debug!("Removed cache {}", key);
        Ok(true)
    }
}

async fn read_entry(dir: &Path) -> ShipyardResult<Option<CacheEntry>> {
    let path = dir.join(ENTRY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ShipyardError::io(format!("reading {}", path.display()), e))?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Recursively copy `src` into `dest`, returning bytes copied
fn copy_tree(src: &Path, dest: &Path) -> io::Result<u64> {
    let meta = fs::metadata(src)?;
    if meta.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        return fs::copy(src, dest);
    }

    fs::create_dir_all(dest)?;
    let mut total = 0;
    for item in fs::read_dir(src)? {
        let item = item?;
        total += copy_tree(&item.path(), &dest.join(item.file_name()))?;
    }
    Ok(total)
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
