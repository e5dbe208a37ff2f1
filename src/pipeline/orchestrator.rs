//! Pipeline orchestrator
//!
//! Executes a validated stage graph:
//!
//! ```text
//! StageGraph (topological)      per stage                    per job (own task)
//! ┌──────────────┐        ┌──────────────────────┐      ┌────────────────────────┐
//! │ verify       │──────► │ deps all succeeded?  │─yes─►│ restore cache          │
//! │ release ◄─dep│        │  no → Blocked        │      │ install / build / test │
//! └──────────────┘        └──────────────────────┘      │ publish / save cache   │
//!                                                       └────────────────────────┘
//! ```
//!
//! Jobs in a stage run concurrently on separate tokio tasks and share nothing
//! mutable except the key-partitioned cache. A failing or panicking job only
//! marks its own record; siblings keep running and keep their artifacts.

use crate::artifact::ArtifactPublisher;
use crate::cache::{CacheKey, CacheLeases, CachePayload, CacheStore};
use crate::error::{ShipyardError, ShipyardResult};
use crate::events::{EventLog, PipelineEvent};
use crate::pipeline::matrix::HostPolicy;
use crate::pipeline::record::{JobRecord, RunRecord, StageRecord, StageStatus};
use crate::pipeline::stage::{JobSpec, Profile, Stage, StageGraph, Step};
use crate::toolchain::{OutputSink, Toolchain};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives progress callbacks while a run executes
pub trait RunObserver: Send + Sync {
    fn stage_started(&self, _stage: &Stage) {}
    fn stage_blocked(&self, _stage: &Stage, _blocked_on: &[String]) {}
    fn job_started(&self, _stage: &str, _job: &JobSpec) {}
    fn job_step(&self, _job: &str, _step: Step) {}
    fn job_output(&self, _job: &str, _line: &str) {}
    fn job_finished(&self, _stage: &str, _record: &JobRecord) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Per-run settings shared by every job
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Source tree, read-only for the duration of the run
    pub project_dir: PathBuf,
    /// Days each published artifact is retained
    pub retention_days: u32,
    pub host_policy: HostPolicy,
    /// Cargo.lock hash recorded with saved caches
    pub lock_hash: Option<String>,
}

/// Runs stage graphs
pub struct Orchestrator {
    toolchain: Arc<dyn Toolchain>,
    cache: Option<Arc<dyn CacheStore>>,
    leases: CacheLeases,
    observer: Arc<dyn RunObserver>,
    events: EventLog,
    settings: Arc<RunSettings>,
}

impl Orchestrator {
    /// Orchestrator without caching, observer or event log
    pub fn new(toolchain: Arc<dyn Toolchain>, settings: RunSettings) -> Self {
        Self {
            toolchain,
            cache: None,
            leases: CacheLeases::new(),
            observer: Arc::new(NoopObserver),
            events: EventLog::disabled(),
            settings: Arc::new(settings),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Execute `graph` for `record`, publishing through `publisher`.
    ///
    /// Never fails as a whole: every job and stage outcome lands in the
    /// returned record, whose status is success only if all stages succeeded.
    pub async fn execute(
        &self,
        mut record: RunRecord,
        graph: StageGraph,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> RunRecord {
        info!(
            run_id = %record.id,
            revision = %record.trigger.revision,
            branch = %record.trigger.branch,
            "Pipeline run started"
        );
        self.events
            .record(
                &record.id,
                PipelineEvent::RunStarted {
                    trigger: &record.trigger,
                },
            )
            .await;

        let runner = JobRunner {
            toolchain: Arc::clone(&self.toolchain),
            cache: self.cache.clone(),
            publisher,
            leases: self.leases.clone(),
            observer: Arc::clone(&self.observer),
            settings: Arc::clone(&self.settings),
        };

        let mut succeeded: HashSet<String> = HashSet::new();

        for stage in graph.into_stages() {
            let blocked_on: Vec<String> = stage
                .depends_on
                .iter()
                .filter(|d| !succeeded.contains(d.as_str()))
                .cloned()
                .collect();

            if !blocked_on.is_empty() {
                warn!(
                    run_id = %record.id,
                    stage = %stage.name,
                    "Stage not scheduled; waiting on {}",
                    blocked_on.join(", ")
                );
                self.observer.stage_blocked(&stage, &blocked_on);
                self.events
                    .record(
                        &record.id,
                        PipelineEvent::StageBlocked {
                            stage: &stage.name,
                            blocked_on: &blocked_on,
                        },
                    )
                    .await;
                record.stages.push(StageRecord::blocked(&stage, blocked_on));
                continue;
            }

            self.observer.stage_started(&stage);
            debug!(run_id = %record.id, stage = %stage.name, jobs = stage.jobs.len(), "Stage started");

            let jobs = runner.run_stage(&stage).await;
            for job in &jobs {
                self.log_job(&record.id, &stage.name, job).await;
            }

            let stage_record = StageRecord::completed(&stage, jobs);
            if stage_record.status == StageStatus::Success {
                succeeded.insert(stage.name.clone());
            }
            info!(
                run_id = %record.id,
                stage = %stage.name,
                status = %stage_record.status,
                "Stage completed"
            );
            self.events
                .record(
                    &record.id,
                    PipelineEvent::StageCompleted {
                        stage: &stage.name,
                        status: stage_record.status,
                    },
                )
                .await;
            record.stages.push(stage_record);
        }

        record.finish();
        info!(run_id = %record.id, status = %record.status, "Pipeline run finished");
        self.events
            .record(
                &record.id,
                PipelineEvent::RunCompleted {
                    status: record.status,
                    artifacts: record.artifacts().iter().map(|a| a.name.as_str()).collect(),
                },
            )
            .await;

        record
    }

    async fn log_job(&self, run_id: &str, stage: &str, job: &JobRecord) {
        self.events
            .record(
                run_id,
                PipelineEvent::JobCompleted {
                    stage,
                    job: &job.name,
                    status: job.status,
                    failure: job.failure.as_ref(),
                },
            )
            .await;

        if let Some(artifact) = &job.artifact {
            self.events
                .record(run_id, PipelineEvent::ArtifactPublished { artifact })
                .await;
        }
    }
}

/// Verify and release builds of the same triple keep separate caches
fn cache_key(job: &JobSpec) -> CacheKey {
    match job.entry {
        Some(_) => CacheKey::for_target(&job.target),
        None => CacheKey::for_verify(&job.target),
    }
}

/// Everything a job task needs; cloned into each task
#[derive(Clone)]
struct JobRunner {
    toolchain: Arc<dyn Toolchain>,
    cache: Option<Arc<dyn CacheStore>>,
    publisher: Arc<dyn ArtifactPublisher>,
    leases: CacheLeases,
    observer: Arc<dyn RunObserver>,
    settings: Arc<RunSettings>,
}

impl JobRunner {
    /// Spawn every job of the stage on its own task and wait for all of them.
    /// Records come back in declaration order.
    async fn run_stage(&self, stage: &Stage) -> Vec<JobRecord> {
        let handles: Vec<_> = stage
            .jobs
            .iter()
            .map(|job| {
                let runner = self.clone();
                let stage_name = stage.name.clone();
                let job = job.clone();
                tokio::spawn(async move { runner.run_job(&stage_name, job).await })
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        for (job, handle) in stage.jobs.iter().zip(handles) {
            match handle.await {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(stage = %stage.name, job = %job.name, "Job task aborted: {}", e);
                    let mut record = JobRecord::start(job);
                    record.fail(
                        None,
                        &ShipyardError::Internal(format!("job {} aborted: {}", job.name, e)),
                    );
                    self.observer.job_finished(&stage.name, &record);
                    records.push(record);
                }
            }
        }
        records
    }

    async fn run_job(&self, stage: &str, job: JobSpec) -> JobRecord {
        let mut record = JobRecord::start(&job);

        if let Some(entry) = &job.entry {
            if self.settings.host_policy == HostPolicy::Native && !entry.host.is_native() {
                debug!(target = %job.target, host = %entry.host, "Skipping foreign-host job");
                record.skip(format!("{} jobs do not run on this host", entry.host));
                self.observer.job_finished(stage, &record);
                return record;
            }
        }

        self.observer.job_started(stage, &job);
        info!(stage, target = %job.target, "Job started");

        let uses_cache = self.cache.is_some()
            && job
                .steps
                .iter()
                .any(|s| matches!(s, Step::RestoreCache | Step::SaveCache));
        let _lease = if uses_cache {
            match self.leases.acquire(&cache_key(&job)) {
                Ok(lease) => Some(lease),
                Err(e) => {
                    record.fail(None, &e);
                    self.observer.job_finished(stage, &record);
                    return record;
                }
            }
        } else {
            None
        };

        for step in &job.steps {
            self.observer.job_step(&job.name, *step);
            debug!(target = %job.target, step = %step, "Running step");

            if let Err(e) = self.run_step(*step, &job, &mut record).await {
                warn!(stage, target = %job.target, step = %step, "Job failed: {}", e);
                record.fail(Some(*step), &e);
                break;
            }
        }

        record.succeed();
        self.observer.job_finished(stage, &record);
        record
    }

    async fn run_step(
        &self,
        step: Step,
        job: &JobSpec,
        record: &mut JobRecord,
    ) -> ShipyardResult<()> {
        let project = &self.settings.project_dir;
        let build_target = job.build_target();

        match step {
            Step::RestoreCache => {
                let Some(cache) = &self.cache else {
                    return Ok(());
                };
                let key = cache_key(job);
                match cache.restore(&key, project).await {
                    Ok(entry) => record.cache_hit = Some(entry.is_some()),
                    Err(e) => {
                        warn!(target = %job.target, "Cache restore failed: {}", e);
                        record.cache_hit = Some(false);
                        record.warnings.push(format!("cache restore failed: {}", e));
                    }
                }
                Ok(())
            }
            Step::InstallTarget => self.toolchain.install_target(&job.target).await,
            Step::Build(profile) => {
                self.toolchain
                    .build(project, profile, build_target, self.output_sink(&job.name))
                    .await
            }
            Step::Test => {
                self.toolchain
                    .test(project, build_target, self.output_sink(&job.name))
                    .await
            }
            Step::PublishArtifact => {
                let entry = job.entry.as_ref().ok_or_else(|| {
                    ShipyardError::Internal(format!("job {} has no artifact to publish", job.name))
                })?;
                let path = project.join(&entry.artifact_path);
                let artifact = self
                    .publisher
                    .publish(entry.artifact_name(), &path, self.settings.retention_days)
                    .await?;
                record.artifact = Some(artifact);
                Ok(())
            }
            Step::SaveCache => {
                let Some(cache) = &self.cache else {
                    return Ok(());
                };
                let profile = job
                    .steps
                    .iter()
                    .find_map(|s| match s {
                        Step::Build(p) => Some(*p),
                        _ => None,
                    })
                    .unwrap_or(Profile::Debug);
                let key = cache_key(job);
                let payload = CachePayload::for_build(build_target, profile);
                if let Err(e) = cache
                    .save(&key, project, &payload, self.settings.lock_hash.clone())
                    .await
                {
                    warn!(target = %job.target, "Cache save failed: {}", e);
                    record.warnings.push(format!("cache save failed: {}", e));
                }
                Ok(())
            }
        }
    }

    fn output_sink(&self, job: &str) -> OutputSink {
        let observer = Arc::clone(&self.observer);
        let job = job.to_string();
        Arc::new(move |line: String| observer.job_output(&job, &line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::cache::FsCacheStore;
    use crate::pipeline::matrix::{default_artifact_path, default_matrix, TargetTriple};
    use crate::pipeline::record::{JobStatus, RunStatus};
    use crate::pipeline::stage::{RELEASE_STAGE, VERIFY_STAGE};
    use crate::pipeline::trigger::{EventKind, Trigger};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const BIN: &str = "sso-profiles";
    const LINUX: &str = "x86_64-unknown-linux-gnu";
    const MAC_X86: &str = "x86_64-apple-darwin";
    const MAC_ARM: &str = "aarch64-apple-darwin";
    const WINDOWS: &str = "x86_64-pc-windows-msvc";

    /// Toolchain that "builds" by writing files and fails on request
    #[derive(Default)]
    struct ScriptedToolchain {
        fail_tests: bool,
        fail_build: Vec<String>,
        fail_install: Vec<String>,
        panic_build: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedToolchain {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Toolchain for ScriptedToolchain {
        async fn is_available(&self) -> bool {
            true
        }

        async fn build(
            &self,
            project_dir: &Path,
            profile: Profile,
            target: Option<&TargetTriple>,
            on_output: OutputSink,
        ) -> ShipyardResult<()> {
            let name = target.map(|t| t.to_string()).unwrap_or_else(|| "host".to_string());
            self.record(format!("build {} {}", profile, name));
            on_output(format!("   Compiling {} v0.1.0", BIN));

            if self.panic_build.contains(&name) {
                panic!("linker exploded for {}", name);
            }
            if self.fail_build.contains(&name) {
                return Err(ShipyardError::Compile {
                    profile: profile.to_string(),
                    target: target.map(|t| t.to_string()),
                    output: "error: linker `link.exe` not found".to_string(),
                });
            }

            let deps = match target {
                Some(t) => project_dir.join("target").join(t.as_str()).join(profile.to_string()),
                None => project_dir.join("target").join(profile.to_string()),
            }
            .join("deps");
            std::fs::create_dir_all(&deps).unwrap();
            std::fs::write(deps.join("libserde.rlib"), b"rlib").unwrap();

            if let Some(t) = target {
                let bin = project_dir.join(default_artifact_path(t, BIN));
                std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
                std::fs::write(bin, name.as_bytes()).unwrap();
            }
            Ok(())
        }

        async fn test(
            &self,
            _project_dir: &Path,
            _target: Option<&TargetTriple>,
            _on_output: OutputSink,
        ) -> ShipyardResult<()> {
            self.record("test".to_string());
            if self.fail_tests {
                return Err(ShipyardError::Test {
                    output: "test profiles::merge ... FAILED".to_string(),
                });
            }
            Ok(())
        }

        async fn install_target(&self, target: &TargetTriple) -> ShipyardResult<()> {
            self.record(format!("install {}", target));
            if self.fail_install.iter().any(|t| t == target.as_str()) {
                return Err(ShipyardError::ToolchainInstall {
                    target: target.to_string(),
                    reason: "component unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn installed_targets(&self) -> ShipyardResult<Vec<TargetTriple>> {
            Ok(vec![])
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Collects job names as observed
    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        blocked: Mutex<Vec<String>>,
        output: Mutex<usize>,
    }

    impl RunObserver for Recorder {
        fn stage_blocked(&self, stage: &Stage, _blocked_on: &[String]) {
            self.blocked.lock().unwrap().push(stage.name.clone());
        }
        fn job_started(&self, _stage: &str, job: &JobSpec) {
            self.started.lock().unwrap().push(job.name.clone());
        }
        fn job_output(&self, _job: &str, _line: &str) {
            *self.output.lock().unwrap() += 1;
        }
    }

    struct Harness {
        project: TempDir,
        state: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                project: TempDir::new().unwrap(),
                state: TempDir::new().unwrap(),
            }
        }

        fn settings(&self, host_policy: HostPolicy) -> RunSettings {
            RunSettings {
                project_dir: self.project.path().to_path_buf(),
                retention_days: 7,
                host_policy,
                lock_hash: Some("abc123def456".to_string()),
            }
        }

        fn graph(&self, cache: bool) -> StageGraph {
            let reference = TargetTriple::parse(LINUX).unwrap();
            let release = default_matrix(BIN)
                .into_iter()
                .map(|e| JobSpec::release(e, cache))
                .collect();
            StageGraph::verify_then_release(JobSpec::verify(reference, cache), release).unwrap()
        }

        fn artifacts(&self) -> FsArtifactStore {
            FsArtifactStore::new(self.state.path().join("artifacts"))
        }

        fn cache(&self) -> Arc<dyn CacheStore> {
            Arc::new(FsCacheStore::new(self.state.path().join("cache")))
        }

        async fn run(&self, orchestrator: &Orchestrator, cache: bool) -> RunRecord {
            let record = RunRecord::new(
                Trigger::new(EventKind::Push, "0123456789abcdef", "main"),
                self.project.path().to_path_buf(),
            );
            let publisher = Arc::new(self.artifacts().publisher(record.id.clone()));
            orchestrator.execute(record, self.graph(cache), publisher).await
        }
    }

    fn artifact_names(record: &RunRecord) -> Vec<String> {
        let mut names: Vec<_> = record.artifacts().iter().map(|a| a.name.clone()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn all_green_publishes_four_artifacts() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain::default());
        let orchestrator = Orchestrator::new(toolchain.clone(), h.settings(HostPolicy::All));

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(
            artifact_names(&record),
            vec![MAC_ARM, MAC_X86, WINDOWS, LINUX]
        );
        assert_eq!(h.artifacts().list(Some(&record.id)).await.unwrap().len(), 4);

        let windows = record.jobs().find(|j| j.name == WINDOWS).unwrap();
        let artifact = windows.artifact.as_ref().unwrap();
        assert!(artifact.source_path.ends_with("sso-profiles.exe"));
        assert_eq!(artifact.retention_days, 7);
    }

    #[tokio::test]
    async fn failing_test_blocks_release() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain {
            fail_tests: true,
            ..Default::default()
        });
        let recorder = Arc::new(Recorder::default());
        let orchestrator = Orchestrator::new(toolchain.clone(), h.settings(HostPolicy::All))
            .with_observer(recorder.clone());

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Failure);
        let release = record.stage(RELEASE_STAGE).unwrap();
        assert_eq!(release.status, StageStatus::Blocked);
        assert!(release.jobs.is_empty());
        assert!(record.artifacts().is_empty());
        assert!(h.artifacts().list(None).await.unwrap().is_empty());

        let verify = &record.stage(VERIFY_STAGE).unwrap().jobs[0];
        assert_eq!(verify.failure.as_ref().unwrap().kind, "test");
        assert_eq!(verify.failure.as_ref().unwrap().step, Some(Step::Test));

        // No release build or target install ever reached the toolchain
        assert!(toolchain
            .calls()
            .iter()
            .all(|c| !c.starts_with("install") && !c.starts_with("build release")));
        assert_eq!(*recorder.started.lock().unwrap(), vec![VERIFY_STAGE.to_string()]);
        assert_eq!(*recorder.blocked.lock().unwrap(), vec![RELEASE_STAGE.to_string()]);
    }

    #[tokio::test]
    async fn failing_debug_build_skips_tests() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain {
            fail_build: vec!["host".to_string()],
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(toolchain.clone(), h.settings(HostPolicy::All));

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Failure);
        assert!(!toolchain.calls().contains(&"test".to_string()));
        let verify = &record.stage(VERIFY_STAGE).unwrap().jobs[0];
        assert_eq!(verify.failure.as_ref().unwrap().kind, "compile");
    }

    #[tokio::test]
    async fn windows_failure_keeps_sibling_artifacts() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain {
            fail_build: vec![WINDOWS.to_string()],
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(toolchain, h.settings(HostPolicy::All));

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Failure);
        assert_eq!(artifact_names(&record), vec![MAC_ARM, MAC_X86, LINUX]);
        assert_eq!(h.artifacts().list(Some(&record.id)).await.unwrap().len(), 3);

        let windows = record.jobs().find(|j| j.name == WINDOWS).unwrap();
        assert_eq!(windows.status, JobStatus::Failure);
        assert_eq!(windows.failure.as_ref().unwrap().kind, "compile");
        assert!(windows.artifact.is_none());
        assert!(record.failure_summary().contains("release/x86_64-pc-windows-msvc (compile)"));
    }

    #[tokio::test]
    async fn toolchain_install_failure_is_isolated() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain {
            fail_install: vec![MAC_ARM.to_string()],
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(toolchain.clone(), h.settings(HostPolicy::All));

        let record = h.run(&orchestrator, false).await;

        let arm = record.jobs().find(|j| j.name == MAC_ARM).unwrap();
        assert_eq!(arm.failure.as_ref().unwrap().kind, "toolchain");
        assert_eq!(arm.failure.as_ref().unwrap().step, Some(Step::InstallTarget));
        assert!(!toolchain.calls().contains(&format!("build release {}", MAC_ARM)));
        assert_eq!(artifact_names(&record), vec![MAC_X86, WINDOWS, LINUX]);
    }

    #[tokio::test]
    async fn panicking_job_is_contained() {
        let h = Harness::new();
        let toolchain = Arc::new(ScriptedToolchain {
            panic_build: vec![MAC_X86.to_string()],
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(toolchain, h.settings(HostPolicy::All));

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Failure);
        let mac = record.jobs().find(|j| j.name == MAC_X86).unwrap();
        assert_eq!(mac.failure.as_ref().unwrap().kind, "internal");
        assert_eq!(artifact_names(&record), vec![MAC_ARM, WINDOWS, LINUX]);
    }

    #[tokio::test]
    async fn warm_cache_produces_identical_artifacts() {
        let h = Harness::new();
        let cache = h.cache();
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedToolchain::default()),
            h.settings(HostPolicy::All),
        )
        .with_cache(cache.clone());

        let cold = h.run(&orchestrator, true).await;
        assert!(cold.jobs().all(|j| j.cache_hit == Some(false)));

        let warm = h.run(&orchestrator, true).await;
        assert_eq!(warm.status, RunStatus::Success);
        assert!(warm.jobs().all(|j| j.cache_hit == Some(true)));

        assert_eq!(artifact_names(&cold), artifact_names(&warm));
        let paths = |r: &RunRecord| {
            let mut p: Vec<_> = r.artifacts().iter().map(|a| a.source_path.clone()).collect();
            p.sort();
            p
        };
        assert_eq!(paths(&cold), paths(&warm));

        // Verify's namespace plus one per release target
        let keys: Vec<_> = cache
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect();
        assert_eq!(keys.len(), 5);
        assert!(keys.contains(&LINUX.to_string()));
        assert!(keys.contains(&format!("verify-{}", LINUX)));
    }

    #[tokio::test]
    async fn failed_job_does_not_save_cache() {
        let h = Harness::new();
        let cache = h.cache();
        let toolchain = Arc::new(ScriptedToolchain {
            fail_build: vec![WINDOWS.to_string()],
            ..Default::default()
        });
        let orchestrator =
            Orchestrator::new(toolchain, h.settings(HostPolicy::All)).with_cache(cache.clone());

        h.run(&orchestrator, true).await;

        let keys: Vec<_> = cache
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect();
        assert!(!keys.contains(&WINDOWS.to_string()));
        assert!(keys.contains(&MAC_ARM.to_string()));
    }

    #[tokio::test]
    async fn native_policy_skips_foreign_hosts() {
        let h = Harness::new();
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedToolchain::default()),
            h.settings(HostPolicy::Native),
        );

        let record = h.run(&orchestrator, false).await;

        assert_eq!(record.status, RunStatus::Success);
        let release = record.stage(RELEASE_STAGE).unwrap();
        for job in &release.jobs {
            let native = job.host.map(|host| host.is_native()).unwrap_or(false);
            if native {
                assert_eq!(job.status, JobStatus::Success);
            } else {
                assert_eq!(job.status, JobStatus::Skipped);
                assert!(job.artifact.is_none());
            }
        }
    }

    #[tokio::test]
    async fn build_output_reaches_observer() {
        let h = Harness::new();
        let recorder = Arc::new(Recorder::default());
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedToolchain::default()),
            h.settings(HostPolicy::All),
        )
        .with_observer(recorder.clone());

        h.run(&orchestrator, false).await;

        // One line per build: verify plus four release jobs
        assert_eq!(*recorder.output.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn event_log_records_run() {
        let h = Harness::new();
        let log_path = h.state.path().join("events.log");
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedToolchain {
                fail_build: vec![WINDOWS.to_string()],
                ..Default::default()
            }),
            h.settings(HostPolicy::All),
        )
        .with_event_log(EventLog::with_path(log_path.clone()));

        let record = h.run(&orchestrator, false).await;

        let content = std::fs::read_to_string(log_path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines.iter().all(|l| l["run_id"] == record.id.as_str()));
        let events: Vec<String> = lines
            .iter()
            .map(|l| l["event"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(events.first().map(String::as_str), Some("run.started"));
        assert_eq!(events.last().map(String::as_str), Some("run.completed"));
        assert_eq!(events.iter().filter(|e| *e == "job.completed").count(), 5);
        assert_eq!(events.iter().filter(|e| *e == "artifact.published").count(), 3);
    }
}
