//! Run records: the persisted outcome of a pipeline run

use crate::artifact::BuildArtifact;
use crate::config::ConfigManager;
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::Host;
use crate::pipeline::stage::{JobSpec, Stage, Step};
use crate::pipeline::trigger::Trigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

/// Stage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failure,
    /// Not scheduled because a dependency did not succeed
    Blocked,
}

/// Job outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failure,
    /// Not attempted on this host
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Step that failed (`None` when the job could not start)
    pub step: Option<Step>,
    /// Failure class: compile, test, toolchain, publish, cache, internal
    pub kind: String,
    pub message: String,
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub target: String,
    pub host: Option<Host>,
    pub status: JobStatus,
    /// Whether the job's cache was restored (`None` when caching is off)
    pub cache_hit: Option<bool>,
    /// Non-fatal cache problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub failure: Option<JobFailure>,
    pub skip_reason: Option<String>,
    pub artifact: Option<BuildArtifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Record for a job that is starting now
    pub fn start(job: &JobSpec) -> Self {
        Self {
            name: job.name.clone(),
            target: job.target.to_string(),
            host: job.entry.as_ref().map(|e| e.host),
            status: JobStatus::Running,
            cache_hit: None,
            warnings: Vec::new(),
            failure: None,
            skip_reason: None,
            artifact: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark failed at `step` with `err`
    pub fn fail(&mut self, step: Option<Step>, err: &ShipyardError) {
        self.status = JobStatus::Failure;
        self.failure = Some(JobFailure {
            step,
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        self.finished_at = Some(Utc::now());
    }

    /// Mark skipped with a reason
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Mark succeeded unless already failed or skipped
    pub fn succeed(&mut self) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Success;
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at.map(|f| (f - self.started_at).num_seconds())
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub depends_on: Vec<String>,
    pub status: StageStatus,
    /// Dependencies that did not succeed, for blocked stages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_on: Vec<String>,
    pub jobs: Vec<JobRecord>,
}

impl StageRecord {
    /// A stage that never scheduled any job
    pub fn blocked(stage: &Stage, blocked_on: Vec<String>) -> Self {
        Self {
            name: stage.name.clone(),
            depends_on: stage.depends_on.clone(),
            status: StageStatus::Blocked,
            blocked_on,
            jobs: Vec::new(),
        }
    }

    /// A stage whose jobs all ran; fails if any job failed
    pub fn completed(stage: &Stage, jobs: Vec<JobRecord>) -> Self {
        let status = if jobs.iter().any(|j| j.status == JobStatus::Failure) {
            StageStatus::Failure
        } else {
            StageStatus::Success
        };
        Self {
            name: stage.name.clone(),
            depends_on: stage.depends_on.clone(),
            status,
            blocked_on: Vec::new(),
            jobs,
        }
    }
}

/// One pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub trigger: Trigger,
    pub project_dir: PathBuf,
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a running record with a fresh id
    pub fn new(trigger: Trigger, project_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            trigger,
            project_dir,
            status: RunStatus::Running,
            stages: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// First 8 characters of the id
    pub fn short_id(&self) -> &str {
        abbreviate(&self.id)
    }

    /// Settle the aggregate status: success only if every stage succeeded
    pub fn finish(&mut self) {
        self.status = if self
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Success)
        {
            RunStatus::Success
        } else {
            RunStatus::Failure
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobRecord> {
        self.stages.iter().flat_map(|s| s.jobs.iter())
    }

    /// Every artifact published during the run
    pub fn artifacts(&self) -> Vec<&BuildArtifact> {
        self.jobs().filter_map(|j| j.artifact.as_ref()).collect()
    }

    /// `stage/job` names of failed jobs, plus blocked stages
    pub fn failure_summary(&self) -> String {
        let mut parts: Vec<String> = self
            .stages
            .iter()
            .flat_map(|s| {
                s.jobs
                    .iter()
                    .filter(|j| j.status == JobStatus::Failure)
                    .map(move |j| {
                        let kind = j.failure.as_ref().map(|f| f.kind.as_str()).unwrap_or("?");
                        format!("{}/{} ({})", s.name, j.name, kind)
                    })
            })
            .collect();
        parts.extend(
            self.stages
                .iter()
                .filter(|s| s.status == StageStatus::Blocked)
                .map(|s| format!("{} blocked", s.name)),
        );
        parts.join(", ")
    }
}

/// First 8 characters of an id or revision, cut on a char boundary
pub fn abbreviate(id: &str) -> &str {
    let end = id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

/// Persisted run records, one JSON file per run
pub struct RunHistory {
    dir: PathBuf,
}

impl RunHistory {
    /// History in the default state directory
    pub async fn open() -> ShipyardResult<Self> {
        ConfigManager::ensure_state_dirs().await?;
        Ok(Self::with_dir(ConfigManager::runs_dir()))
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Save a run record
    pub async fn save(&self, record: &RunRecord) -> ShipyardResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ShipyardError::io("creating runs directory", e))?;

        let path = self.file_path(&record.id);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content)
            .await
            .map_err(|e| ShipyardError::io(format!("writing run file {}", path.display()), e))?;

        debug!("Saved run {}", record.id);
        Ok(())
    }

    /// Load a run by full id or unique id prefix
    pub async fn load(&self, id: &str) -> ShipyardResult<RunRecord> {
        let exact = self.file_path(id);
        if exact.exists() {
            let content = fs::read_to_string(&exact)
                .await
                .map_err(|e| ShipyardError::io(format!("reading run file {}", exact.display()), e))?;
            return Ok(serde_json::from_str(&content)?);
        }

        let mut matches: Vec<RunRecord> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.id.starts_with(id))
            .collect();
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(ShipyardError::RunNotFound(id.to_string())),
            n => Err(ShipyardError::User(format!(
                "Run id prefix {} is ambiguous ({} matches)",
                id, n
            ))),
        }
    }

    /// All runs, newest first
    pub async fn list(&self) -> ShipyardResult<Vec<RunRecord>> {
        let mut runs = Vec::new();

        if !self.dir.exists() {
            return Ok(runs);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| ShipyardError::io("reading runs directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShipyardError::io("reading run entry", e))?
        {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .await
                    .map_err(|e| ShipyardError::io(format!("reading {}", path.display()), e))?;
                match serde_json::from_str::<RunRecord>(&content) {
                    Ok(run) => runs.push(run),
                    Err(e) => debug!("Skipping unreadable run file {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}
