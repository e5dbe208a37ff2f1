//! Artifact store: named, time-bounded copies of release binaries
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<run id>/<artifact name>/artifact.json
//! <root>/<run id>/<artifact name>/<binary file>
//! ```
//!
//! A publish fills `<root>/<run id>/.staging-<artifact name>/` and renames it
//! into place only once the binary and manifest are both written, so a failed
//! publish never leaves a partial artifact behind.

use crate::error::{ShipyardError, ShipyardResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "artifact.json";
const STAGING_PREFIX: &str = ".staging-";

/// A published build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Run that published it
    pub run_id: String,
    /// Artifact name (the target triple for release jobs)
    pub name: String,
    /// Where the binary was built
    pub source_path: PathBuf,
    /// Where the store keeps it
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub retention_days: u32,
    pub published_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BuildArtifact {
    /// Whether retention has elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Publishes artifacts for a single run
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Store `file_path` as artifact `name`, retained for `retention_days`.
    /// Names are unique within a run.
    async fn publish(
        &self,
        name: &str,
        file_path: &Path,
        retention_days: u32,
    ) -> ShipyardResult<BuildArtifact>;
}

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publisher scoped to one run
    pub fn publisher(&self, run_id: impl Into<String>) -> RunPublisher {
        RunPublisher {
            store: self.clone(),
            run_id: run_id.into(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// All stored artifacts, optionally restricted to one run
    pub async fn list(&self, run_id: Option<&str>) -> ShipyardResult<Vec<BuildArtifact>> {
        let mut artifacts = Vec::new();
        for run_dir in list_dirs(&self.root).await? {
            if let Some(id) = run_id {
                if run_dir.file_name().and_then(|n| n.to_str()) != Some(id) {
                    continue;
                }
            }
            for artifact_dir in list_dirs(&run_dir).await? {
                if is_staging(&artifact_dir) {
                    continue;
                }
                if let Some(artifact) = read_manifest(&artifact_dir).await? {
                    artifacts.push(artifact);
                }
            }
        }
        artifacts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(artifacts)
    }

    /// Delete artifacts whose retention elapsed at `now` (or all, if `all`).
    /// Returns the deleted artifacts.
    pub async fn prune(&self, now: DateTime<Utc>, all: bool) -> ShipyardResult<Vec<BuildArtifact>> {
        let mut removed = Vec::new();
        for artifact in self.list(None).await? {
            if !all && !artifact.is_expired(now) {
                continue;
            }
            let dir = self.root.join(&artifact.run_id).join(&artifact.name);
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| ShipyardError::io(format!("removing artifact {}", dir.display()), e))?;
            debug!("Pruned artifact {}/{}", artifact.run_id, artifact.name);
            removed.push(artifact);
        }

        // Drop staging leftovers of interrupted publishes, then run
        // directories left empty
        for run_dir in list_dirs(&self.root).await? {
            for leftover in list_dirs(&run_dir).await?.into_iter().filter(|d| is_staging(d)) {
                debug!("Removing staging leftover {}", leftover.display());
                let _ = fs::remove_dir_all(&leftover).await;
            }
            if list_dirs(&run_dir).await?.is_empty() {
                let _ = fs::remove_dir(&run_dir).await;
            }
        }

        Ok(removed)
    }
}

/// Run-scoped publisher that enforces unique artifact names
#[derive(Debug)]
pub struct RunPublisher {
    store: FsArtifactStore,
    run_id: String,
    claimed: Mutex<HashSet<String>>,
}

impl RunPublisher {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn claim(&self, name: &str) -> ShipyardResult<()> {
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| ShipyardError::Internal("artifact name table poisoned".to_string()))?;
        if !claimed.insert(name.to_string()) {
            return Err(ShipyardError::ArtifactDuplicate {
                name: name.to_string(),
                run_id: self.run_id.clone(),
            });
        }
        Ok(())
    }

    fn release_claim(&self, name: &str) {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.remove(name);
        }
    }

    async fn store_file(
        &self,
        name: &str,
        file_path: &Path,
        retention_days: u32,
    ) -> ShipyardResult<BuildArtifact> {
        let publish_err = |reason: String| ShipyardError::ArtifactPublish {
            name: name.to_string(),
            reason,
        };

        let meta = fs::metadata(file_path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ShipyardError::ArtifactNotFound(file_path.to_path_buf())
            } else {
                publish_err(e.to_string())
            }
        })?;
        if !meta.is_file() {
            return Err(publish_err(format!("{} is not a file", file_path.display())));
        }

        let file_name = file_path
            .file_name()
            .ok_or_else(|| publish_err(format!("{} has no file name", file_path.display())))?;
        let run_dir = self.store.root.join(&self.run_id);
        let dir = run_dir.join(name);
        if dir.exists() {
            return Err(ShipyardError::ArtifactDuplicate {
                name: name.to_string(),
                run_id: self.run_id.clone(),
            });
        }

        let staging = run_dir.join(format!("{}{}", STAGING_PREFIX, name));
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging).await;
        }
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| publish_err(e.to_string()))?;

        let published_at = Utc::now();
        let artifact = BuildArtifact {
            run_id: self.run_id.clone(),
            name: name.to_string(),
            source_path: file_path.to_path_buf(),
            stored_path: dir.join(file_name),
            size_bytes: meta.len(),
            retention_days,
            published_at,
            expires_at: published_at + Duration::days(i64::from(retention_days)),
        };

        match fill_staging(&staging, &dir, artifact).await {
            Ok(artifact) => Ok(artifact),
            Err(reason) => {
                if let Err(e) = fs::remove_dir_all(&staging).await {
                    warn!("Failed to clean up {}: {}", staging.display(), e);
                }
                Err(publish_err(reason))
            }
        }
    }
}

/// Copy the binary and write the manifest into `staging`, then move it to
/// `dir`. Errors come back as the reason text of the publish error.
async fn fill_staging(
    staging: &Path,
    dir: &Path,
    mut artifact: BuildArtifact,
) -> Result<BuildArtifact, String> {
    let file_name = artifact
        .stored_path
        .file_name()
        .ok_or_else(|| "stored path has no file name".to_string())?
        .to_owned();
    artifact.size_bytes = fs::copy(&artifact.source_path, staging.join(&file_name))
        .await
        .map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&artifact).map_err(|e| e.to_string())?;
    fs::write(staging.join(MANIFEST_FILE), json)
        .await
        .map_err(|e| e.to_string())?;

    fs::rename(staging, dir).await.map_err(|e| e.to_string())?;
    Ok(artifact)
}

#[async_trait]
impl ArtifactPublisher for RunPublisher {
    async fn publish(
        &self,
        name: &str,
        file_path: &Path,
        retention_days: u32,
    ) -> ShipyardResult<BuildArtifact> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ShipyardError::ArtifactPublish {
                name: name.to_string(),
                reason: "invalid artifact name".to_string(),
            });
        }

        self.claim(name)?;
        match self.store_file(name, file_path, retention_days).await {
            Ok(artifact) => {
                info!(
                    "Published artifact {} ({} days retention)",
                    name, retention_days
                );
                Ok(artifact)
            }
            Err(e) => {
                if !matches!(e, ShipyardError::ArtifactDuplicate { .. }) {
                    self.release_claim(name);
                }
                Err(e)
            }
        }
    }
}

async fn list_dirs(dir: &Path) -> ShipyardResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut reader = match fs::read_dir(dir).await {
        Ok(r) => r,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(ShipyardError::io(format!("reading {}", dir.display()), e)),
    };
    while let Some(item) = reader
        .next_entry()
        .await
        .map_err(|e| ShipyardError::io(format!("reading {}", dir.display()), e))?
    {
        if item.path().is_dir() {
            dirs.push(item.path());
        }
    }
    Ok(dirs)
}

fn is_staging(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

async fn read_manifest(dir: &Path) -> ShipyardResult<Option<BuildArtifact>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| ShipyardError::io(format!("reading {}", path.display()), e))?;
    Ok(Some(serde_json::from_str(&content)?))
}
