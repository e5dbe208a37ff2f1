//! Trigger events that start a pipeline run

use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::record::abbreviate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Push to a branch
    Push,
    /// Pull request targeting a branch
    PullRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// A triggering event with the revision it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub event: EventKind,
    /// Source revision (commit SHA)
    pub revision: String,
    /// Pushed branch, or base branch of a pull request
    pub branch: String,
}

impl Trigger {
    pub fn new(event: EventKind, revision: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            event,
            revision: revision.into(),
            branch: branch.into(),
        }
    }

    /// Whether this event should start a run for the configured branches.
    /// Accepts both `main` and `refs/heads/main` spellings.
    pub fn should_trigger(&self, branches: &[String]) -> bool {
        let branch = self
            .branch
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.branch);
        branches.iter().any(|b| b == branch)
    }

    /// First 8 characters of the revision
    pub fn short_revision(&self) -> &str {
        abbreviate(&self.revision)
    }
}

/// Ask git for the current revision and branch of `project_dir`
pub async fn detect_git_head(project_dir: &Path) -> ShipyardResult<(String, String)> {
    let revision = git(project_dir, &["rev-parse", "HEAD"]).await?;
    let branch = git(project_dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    debug!("Detected git HEAD {} on {}", revision, branch);
    Ok((revision, branch))
}

async fn git(dir: &Path, args: &[&str]) -> ShipyardResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| ShipyardError::command_failed(format!("git {}", args.join(" ")), e))?;

    if !output.status.success() {
        return Err(ShipyardError::command_exec(
            format!("git {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_to_main_triggers() {
        let trigger = Trigger::new(EventKind::Push, "abc", "main");
        assert!(trigger.should_trigger(&["main".to_string()]));
    }

    #[test]
    fn full_ref_triggers() {
        let trigger = Trigger::new(EventKind::PullRequest, "abc", "refs/heads/main");
        assert!(trigger.should_trigger(&["main".to_string()]));
    }

    #[test]
    fn feature_branch_does_not_trigger() {
        let trigger = Trigger::new(EventKind::Push, "abc", "feature/login");
        assert!(!trigger.should_trigger(&["main".to_string()]));
    }

    #[test]
    fn short_revision() {
        let trigger = Trigger::new(EventKind::Push, "0123456789abcdef", "main");
        assert_eq!(trigger.short_revision(), "01234567");

        let trigger = Trigger::new(EventKind::Push, "abc", "main");
        assert_eq!(trigger.short_revision(), "abc");
    }

    #[test]
    fn event_display() {
        assert_eq!(EventKind::PullRequest.to_string(), "pull_request");
    }
}
