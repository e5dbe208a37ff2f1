//! Run command - execute the verify → release pipeline

use crate::artifact::FsArtifactStore;
use crate::cache::{detect_lockfile, FsCacheStore};
use crate::cli::args::{OutputFormat, RunArgs};
use crate::cli::commands::runs::print_run;
use crate::config::{Config, ConfigManager};
use crate::error::{ShipyardError, ShipyardResult};
use crate::events::EventLog;
use crate::pipeline::record::{RunHistory, RunRecord, RunStatus};
use crate::pipeline::trigger::{detect_git_head, Trigger};
use crate::pipeline::{build_plan, Orchestrator, PlanOptions, RunSettings};
use crate::toolchain::{CargoToolchain, Toolchain};
use crate::ui::{self, RunProgress, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> ShipyardResult<()> {
    // JSON and plain output are for scripts: stdout carries only the result
    let machine_output = args.format != OutputFormat::Table;
    let ctx = UiContext::detect().with_plain(machine_output);
    let project_dir = resolve_project_dir(args.project.clone())?;

    let trigger = resolve_trigger(&args, &project_dir).await?;
    if !trigger.should_trigger(&config.trigger.branches) && !args.force {
        let notice = format!(
            "{} on {} does not trigger a run (trigger branches: {})",
            trigger.event,
            trigger.branch,
            config.trigger.branches.join(", ")
        );
        if machine_output {
            eprintln!("{}", notice);
        } else {
            ui::step_info(&ctx, &notice);
            ui::remark(&ctx, "Use --force to run anyway");
        }
        return Ok(());
    }

    let options = PlanOptions {
        targets: args.target,
        no_cache: args.no_cache,
    };
    let plan = build_plan(config, &project_dir, &options)?;

    let toolchain = Arc::new(CargoToolchain::new(config.env.0.clone()));
    if !toolchain.is_available().await {
        return Err(ShipyardError::ToolNotFound {
            name: "cargo".to_string(),
            hint: "The cargo executable is not on PATH.".to_string(),
        });
    }

    let lock_hash = detect_lockfile(&project_dir)?.map(|l| l.hash);
    let settings = RunSettings {
        project_dir: project_dir.clone(),
        retention_days: config.release.retention_days,
        host_policy: args.host_policy.unwrap_or(config.release.host_policy),
        lock_hash,
    };
    debug!(?settings, "Run settings");

    let progress = Arc::new(RunProgress::new(&ctx).on_stderr(machine_output));
    let mut orchestrator = Orchestrator::new(toolchain, settings)
        .with_observer(progress.clone())
        .with_event_log(EventLog::new(config));
    if plan.cache {
        orchestrator =
            orchestrator.with_cache(Arc::new(FsCacheStore::new(ConfigManager::cache_dir())));
    }

    let history = RunHistory::open().await?;
    let record = RunRecord::new(trigger, project_dir);
    history.save(&record).await?;

    let title = format!(
        "Run {} · {} {} @ {}",
        record.short_id(),
        record.trigger.event,
        record.trigger.branch,
        record.trigger.short_revision()
    );
    if machine_output {
        eprintln!("{}", title);
    } else {
        ui::intro(&ctx, &title);
    }
    info!(
        run_id = %record.id,
        targets = plan.matrix.len(),
        binary = %plan.binary,
        "Starting pipeline"
    );

    let store = FsArtifactStore::new(ConfigManager::artifacts_dir());
    let publisher = Arc::new(store.publisher(record.id.clone()));
    let record = orchestrator.execute(record, plan.graph, publisher).await;
    progress.finish();
    history.save(&record).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Plain => {
            for artifact in record.artifacts() {
                println!("{}", artifact.stored_path.display());
            }
        }
        OutputFormat::Table => print_run(&ctx, &record),
    }

    if record.status == RunStatus::Failure {
        return Err(ShipyardError::RunFailed {
            run_id: record.short_id().to_string(),
            failed: record.failure_summary(),
        });
    }

    if args.format == OutputFormat::Table {
        ui::outro_success(
            &ctx,
            &format!("{} artifact(s) published", record.artifacts().len()),
        );
    }
    Ok(())
}

fn resolve_project_dir(project: Option<PathBuf>) -> ShipyardResult<PathBuf> {
    let dir = match project {
        Some(p) => p,
        None => std::env::current_dir()
            .map_err(|e| ShipyardError::io("getting current directory", e))?,
    };
    if !dir.is_dir() {
        return Err(ShipyardError::PathNotFound(dir));
    }
    Ok(dir.canonicalize().unwrap_or(dir))
}

/// Explicit flags win; anything missing comes from git
async fn resolve_trigger(args: &RunArgs, project_dir: &std::path::Path) -> ShipyardResult<Trigger> {
    let (revision, branch) = match (&args.revision, &args.branch) {
        (Some(revision), Some(branch)) => (revision.clone(), branch.clone()),
        (revision, branch) => {
            let (head_revision, head_branch) = detect_git_head(project_dir).await?;
            (
                revision.clone().unwrap_or(head_revision),
                branch.clone().unwrap_or(head_branch),
            )
        }
    };
    Ok(Trigger::new(args.event, revision, branch))
}
