//! Runs command - inspect recorded pipeline runs

use crate::cli::args::{OutputFormat, RunsAction, RunsArgs};
use crate::config::Config;
use crate::error::ShipyardResult;
use crate::pipeline::record::{RunHistory, RunRecord, RunStatus, StageStatus};
use crate::ui::{self, format_job_line, UiContext};
use console::style;

/// Lines of failure output shown per failed job
const FAILURE_EXCERPT_LINES: usize = 8;

/// Execute the runs command
pub async fn execute(args: RunsArgs, _config: &Config) -> ShipyardResult<()> {
    let history = RunHistory::open().await?;

    match args.action {
        RunsAction::List { limit, format } => {
            let mut runs = history.list().await?;
            if limit > 0 {
                runs.truncate(limit);
            }
            list_runs(&runs, format)
        }
        RunsAction::Show { run, format } => {
            let record = history.load(&run).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                OutputFormat::Plain => {
                    for job in record.jobs() {
                        println!("{}\t{}", job.name, job.status);
                    }
                }
                OutputFormat::Table => print_run(&UiContext::detect(), &record),
            }
            Ok(())
        }
    }
}

fn list_runs(runs: &[RunRecord], format: OutputFormat) -> ShipyardResult<()> {
    if runs.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => ui::step_info(&UiContext::detect(), "No runs recorded yet"),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(runs),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(runs)?),
        OutputFormat::Plain => {
            for run in runs {
                println!("{}", run.id);
            }
        }
    }
    Ok(())
}

fn print_table(runs: &[RunRecord]) {
    println!(
        "{:<10} {:<9} {:<13} {:<16} {:<10} {:<17} {}",
        style("ID").bold(),
        style("STATUS").bold(),
        style("EVENT").bold(),
        style("BRANCH").bold(),
        style("REVISION").bold(),
        style("CREATED").bold(),
        style("ARTIFACTS").bold()
    );
    println!("{}", "-".repeat(88));

    for run in runs {
        println!(
            "{:<10} {:<9} {:<13} {:<16} {:<10} {:<17} {}",
            run.short_id(),
            styled_status(run.status),
            run.trigger.event.to_string(),
            run.trigger.branch,
            run.trigger.short_revision(),
            run.created_at.format("%Y-%m-%d %H:%M").to_string(),
            run.artifacts().len()
        );
    }

    println!();
    println!("{} run(s)", runs.len());
}

fn styled_status(status: RunStatus) -> String {
    // Pad before styling so escape codes don't break column widths
    let text = format!("{:<9}", status.to_string());
    match status {
        RunStatus::Success => style(text).green().to_string(),
        RunStatus::Failure => style(text).red().to_string(),
        RunStatus::Running => style(text).yellow().to_string(),
    }
}

/// Human-readable report of one run: stages, jobs, failures and artifacts
pub(crate) fn print_run(ctx: &UiContext, record: &RunRecord) {
    ui::section(ctx, &format!("Run {}", record.id));
    ui::key_value(
        ctx,
        "Trigger",
        &format!("{} {}", record.trigger.event, record.trigger.branch),
    );
    ui::key_value(ctx, "Revision", &record.trigger.revision);
    ui::key_value(ctx, "Project", &record.project_dir.display().to_string());
    ui::key_value(
        ctx,
        "Started",
        &record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    if let Some(finished) = record.finished_at {
        ui::key_value(
            ctx,
            "Duration",
            &format!("{}s", (finished - record.created_at).num_seconds()),
        );
    }
    ui::key_value_status(
        ctx,
        "Status",
        &record.status.to_string(),
        record.status == RunStatus::Success,
    );

    for stage in &record.stages {
        if stage.status == StageStatus::Blocked {
            ui::stage_blocked(ctx, &stage.name, &stage.blocked_on);
            continue;
        }
        ui::stage_header(
            ctx,
            &stage.name,
            &stage.status.to_string(),
            stage.status == StageStatus::Success,
        );

        for job in &stage.jobs {
            println!("{}", format_job_line(&stage.name, job));

            if let Some(ref failure) = job.failure {
                for line in excerpt(&failure.message) {
                    ui::job_detail(None, line);
                }
            }
            if let Some(ref artifact) = job.artifact {
                ui::job_detail(
                    Some(&style("→").cyan().to_string()),
                    &format!(
                        "{} (expires {})",
                        artifact.stored_path.display(),
                        artifact.expires_at.format("%Y-%m-%d")
                    ),
                );
            }
            for warning in &job.warnings {
                ui::job_detail(Some(&style("!").yellow().to_string()), warning);
            }
        }
    }
    println!();
}

/// Last few lines of a failure message
fn excerpt(message: &str) -> Vec<&str> {
    let lines: Vec<&str> = message.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(FAILURE_EXCERPT_LINES);
    lines[start..].to_vec()
}
