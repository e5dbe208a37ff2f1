//! Pipeline event log
//!
//! Appends one JSON line per pipeline event to
//! `~/.local/state/shipyard/events.log`:
//!
//! ```text
//! {"timestamp":"...","run_id":"24b0e80e-...","event":"job.completed","data":{...}}
//! ```
//!
//! Every line carries the run id so a single run can be pulled out of the
//! shared file with `grep`. Write failures are logged and otherwise ignored
//! so a full disk never fails a build.

use crate::artifact::BuildArtifact;
use crate::config::{schema::Config, ConfigManager};
use crate::pipeline::record::{JobFailure, JobStatus, RunStatus, StageStatus};
use crate::pipeline::trigger::Trigger;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Something that happened during a run
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent<'a> {
    #[serde(rename = "run.started")]
    RunStarted { trigger: &'a Trigger },
    #[serde(rename = "stage.blocked")]
    StageBlocked {
        stage: &'a str,
        blocked_on: &'a [String],
    },
    #[serde(rename = "stage.completed")]
    StageCompleted { stage: &'a str, status: StageStatus },
    #[serde(rename = "job.completed")]
    JobCompleted {
        stage: &'a str,
        job: &'a str,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<&'a JobFailure>,
    },
    #[serde(rename = "artifact.published")]
    ArtifactPublished { artifact: &'a BuildArtifact },
    #[serde(rename = "run.completed")]
    RunCompleted {
        status: RunStatus,
        artifacts: Vec<&'a str>,
    },
}

impl PipelineEvent<'_> {
    /// Dotted name written to the `event` field
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "run.started",
            PipelineEvent::StageBlocked { .. } => "stage.blocked",
            PipelineEvent::StageCompleted { .. } => "stage.completed",
            PipelineEvent::JobCompleted { .. } => "job.completed",
            PipelineEvent::ArtifactPublished { .. } => "artifact.published",
            PipelineEvent::RunCompleted { .. } => "run.completed",
        }
    }
}

/// File-based event log that appends JSON lines
#[derive(Debug, Clone)]
pub struct EventLog {
    enabled: bool,
    path: PathBuf,
}

impl EventLog {
    /// Create a new event log from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.run_log,
            path: ConfigManager::event_log_path(),
        }
    }

    /// Event log writing to an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path,
        }
    }

    /// Event log that drops everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    /// Record one event of a run
    pub async fn record(&self, run_id: &str, event: PipelineEvent<'_>) {
        if !self.enabled {
            return;
        }

        let line = match entry_line(run_id, &event) {
            Ok(line) => line,
            Err(e) => {
                warn!(run_id, event = event.name(), "Failed to serialize pipeline event: {}", e);
                return;
            }
        };

        if let Err(e) = self.append(&line).await {
            warn!(run_id, event = event.name(), "Failed to write event log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn entry_line(run_id: &str, event: &PipelineEvent<'_>) -> serde_json::Result<String> {
    let mut entry = serde_json::to_value(event)?;
    entry["timestamp"] = Utc::now().to_rfc3339().into();
    entry["run_id"] = run_id.into();
    let mut line = serde_json::to_string(&entry)?;
    line.push('\n');
    Ok(line)
}
