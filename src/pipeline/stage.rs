//! Stages, jobs and steps, and the dependency graph that gates them

use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::{MatrixEntry, TargetTriple};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Name of the verify stage
pub const VERIFY_STAGE: &str = "verify";
/// Name of the release stage
pub const RELEASE_STAGE: &str = "release";

/// Cargo build profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Debug,
    Release,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// A unit of work inside a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "profile")]
pub enum Step {
    RestoreCache,
    InstallTarget,
    Build(Profile),
    Test,
    PublishArtifact,
    SaveCache,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestoreCache => write!(f, "restore cache"),
            Self::InstallTarget => write!(f, "install target"),
            Self::Build(profile) => write!(f, "build ({})", profile),
            Self::Test => write!(f, "test"),
            Self::PublishArtifact => write!(f, "publish artifact"),
            Self::SaveCache => write!(f, "save cache"),
        }
    }
}

/// One independently executed job
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job name, unique within its stage
    pub name: String,
    /// Triple the job builds for; also its cache key
    pub target: TargetTriple,
    /// Matrix entry for release jobs
    pub entry: Option<MatrixEntry>,
    /// Pass `--target` to cargo instead of building for the host
    pub explicit_target: bool,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl JobSpec {
    /// Debug build plus tests on the reference target
    pub fn verify(reference: TargetTriple, cache: bool) -> Self {
        let mut steps = Vec::new();
        if cache {
            steps.push(Step::RestoreCache);
        }
        steps.extend([Step::Build(Profile::Debug), Step::Test]);
        if cache {
            steps.push(Step::SaveCache);
        }
        Self {
            name: VERIFY_STAGE.to_string(),
            target: reference,
            entry: None,
            explicit_target: false,
            steps,
        }
    }

    /// Build and test for `target` explicitly, for a reference triple that
    /// is not the host's
    pub fn with_explicit_target(mut self) -> Self {
        self.explicit_target = true;
        self
    }

    /// Triple handed to cargo, `None` for a host build
    pub fn build_target(&self) -> Option<&TargetTriple> {
        self.explicit_target.then_some(&self.target)
    }

    /// Cross-compiled release build for one matrix entry
    pub fn release(entry: MatrixEntry, cache: bool) -> Self {
        let mut steps = Vec::new();
        if cache {
            steps.push(Step::RestoreCache);
        }
        steps.extend([
            Step::InstallTarget,
            Step::Build(Profile::Release),
            Step::PublishArtifact,
        ]);
        if cache {
            steps.push(Step::SaveCache);
        }
        Self {
            name: entry.target.to_string(),
            target: entry.target.clone(),
            entry: Some(entry),
            explicit_target: true,
            steps,
        }
    }
}

/// A named set of parallel jobs with dependencies on other stages
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub depends_on: Vec<String>,
    pub jobs: Vec<JobSpec>,
}

/// Validated, topologically ordered stage graph
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Validate names, dependencies and acyclicity, then order the stages
    pub fn new(stages: Vec<Stage>) -> ShipyardResult<Self> {
        let mut names = HashSet::new();
        for stage in &stages {
            if !names.insert(stage.name.as_str()) {
                return Err(ShipyardError::PipelineInvalid(format!(
                    "duplicate stage name: {}",
                    stage.name
                )));
            }
            let mut jobs = HashSet::new();
            for job in &stage.jobs {
                if !jobs.insert(job.name.as_str()) {
                    return Err(ShipyardError::PipelineInvalid(format!(
                        "duplicate job {} in stage {}",
                        job.name, stage.name
                    )));
                }
            }
        }

        for stage in &stages {
            for dep in &stage.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(ShipyardError::PipelineInvalid(format!(
                        "stage '{}' depends on unknown stage '{}'",
                        stage.name, dep
                    )));
                }
            }
        }

        check_cycles(&stages)?;
        let stages = topological_order(stages);
        Ok(Self { stages })
    }

    /// The standard two-stage pipeline: verify, then release fan-out
    pub fn verify_then_release(verify: JobSpec, release: Vec<JobSpec>) -> ShipyardResult<Self> {
        Self::new(vec![
            Stage {
                name: VERIFY_STAGE.to_string(),
                depends_on: vec![],
                jobs: vec![verify],
            },
            Stage {
                name: RELEASE_STAGE.to_string(),
                depends_on: vec![VERIFY_STAGE.to_string()],
                jobs: release,
            },
        ])
    }

    /// Stages in an order where every dependency precedes its dependents
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }
}

fn check_cycles(stages: &[Stage]) -> ShipyardResult<()> {
    let deps: HashMap<&str, Vec<&str>> = stages
        .iter()
        .map(|s| {
            (
                s.name.as_str(),
                s.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    fn visit<'a>(
        node: &'a str,
        deps: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), String> {
        if let Some(start) = path.iter().position(|&n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle.join(" -> "));
        }
        if visited.contains(node) {
            return Ok(());
        }

        path.push(node);
        if let Some(dependencies) = deps.get(node) {
            for dep in dependencies {
                visit(dep, deps, visited, path)?;
            }
        }
        path.pop();
        visited.insert(node);
        Ok(())
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for stage in stages {
        visit(&stage.name, &deps, &mut visited, &mut path)
            .map_err(|path| ShipyardError::CircularDependency { path })?;
    }
    Ok(())
}

/// Kahn-style ordering that keeps declaration order among ready stages.
/// Assumes the graph is acyclic.
fn topological_order(stages: Vec<Stage>) -> Vec<Stage> {
    let mut pending = stages;
    let mut ordered: Vec<Stage> = Vec::with_capacity(pending.len());
    let mut done: HashSet<String> = HashSet::new();

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|s| s.depends_on.iter().all(|d| done.contains(d)));
        match ready {
            Some(idx) => {
                let stage = pending.remove(idx);
                done.insert(stage.name.clone());
                ordered.push(stage);
            }
            None => break,
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matrix::default_matrix;

    fn stage(name: &str, deps: &[&str]) -> Stage {
        Stage {
            name: name.to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            jobs: vec![],
        }
    }

    #[test]
    fn orders_dependencies_first() {
        let graph = StageGraph::new(vec![
            stage("release", &["verify"]),
            stage("verify", &[]),
        ])
        .unwrap();
        let names: Vec<_> = graph.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["verify", "release"]);
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = StageGraph::new(vec![stage("release", &["lint"])]).unwrap_err();
        assert!(err.to_string().contains("unknown stage 'lint'"));
    }

    #[test]
    fn rejects_cycle() {
        let err = StageGraph::new(vec![stage("a", &["b"]), stage("b", &["a"])]).unwrap_err();
        match err {
            ShipyardError::CircularDependency { path } => assert_eq!(path, "a -> b -> a"),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_stage() {
        assert!(StageGraph::new(vec![stage("a", &[]), stage("a", &[])]).is_err());
    }

    #[test]
    fn verify_job_steps() {
        let reference = TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap();
        let job = JobSpec::verify(reference.clone(), true);
        assert_eq!(
            job.steps,
            vec![
                Step::RestoreCache,
                Step::Build(Profile::Debug),
                Step::Test,
                Step::SaveCache
            ]
        );

        let job = JobSpec::verify(reference, false);
        assert_eq!(job.steps, vec![Step::Build(Profile::Debug), Step::Test]);
    }

    #[test]
    fn release_job_named_after_target() {
        let entry = default_matrix("tool").remove(2);
        let job = JobSpec::release(entry, true);
        assert_eq!(job.name, "aarch64-apple-darwin");
        assert_eq!(job.steps.first(), Some(&Step::RestoreCache));
        assert_eq!(job.steps.last(), Some(&Step::SaveCache));
        assert!(job.steps.contains(&Step::InstallTarget));
    }

    #[test]
    fn standard_pipeline_gates_release_on_verify() {
        let reference = TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap();
        let release = default_matrix("tool")
            .into_iter()
            .map(|e| JobSpec::release(e, false))
            .collect();
        let graph = StageGraph::verify_then_release(JobSpec::verify(reference, false), release)
            .unwrap();
        let stages = graph.stages();
        assert_eq!(stages[1].depends_on, vec![VERIFY_STAGE.to_string()]);
        assert_eq!(stages[1].jobs.len(), 4);
    }
}
