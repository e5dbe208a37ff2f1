//! Artifacts command - list and prune published binaries

use crate::artifact::{BuildArtifact, FsArtifactStore};
use crate::cache::format_bytes;
use crate::cli::args::{ArtifactsAction, ArtifactsArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::ShipyardResult;
use crate::pipeline::record::{abbreviate, RunHistory};
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;

/// Execute the artifacts command
pub async fn execute(args: ArtifactsArgs, _config: &Config) -> ShipyardResult<()> {
    let store = FsArtifactStore::new(ConfigManager::artifacts_dir());

    match args.action {
        ArtifactsAction::List { run, format } => {
            // Accept id prefixes the same way `runs show` does
            let run_id = match run {
                Some(prefix) => Some(RunHistory::open().await?.load(&prefix).await?.id),
                None => None,
            };
            let artifacts = store.list(run_id.as_deref()).await?;
            list_artifacts(&artifacts, format)
        }
        ArtifactsAction::Prune { all, yes } => prune_artifacts(&store, all, yes).await,
    }
}

fn list_artifacts(artifacts: &[BuildArtifact], format: OutputFormat) -> ShipyardResult<()> {
    if artifacts.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No artifacts published."),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(artifacts)?),
        OutputFormat::Plain => {
            for artifact in artifacts {
                println!("{}", artifact.stored_path.display());
            }
        }
        OutputFormat::Table => {
            let now = Utc::now();
            println!(
                "{:<10} {:<28} {:<10} {:<17} {:<12}",
                style("RUN").bold(),
                style("NAME").bold(),
                style("SIZE").bold(),
                style("PUBLISHED").bold(),
                style("EXPIRES").bold()
            );
            println!("{}", "-".repeat(80));
            for artifact in artifacts {
                let expires = artifact.expires_at.format("%Y-%m-%d").to_string();
                let expires = if artifact.is_expired(now) {
                    style(format!("{} (expired)", expires)).red().to_string()
                } else {
                    expires
                };
                println!(
                    "{:<10} {:<28} {:<10} {:<17} {}",
                    abbreviate(&artifact.run_id),
                    artifact.name,
                    format_bytes(artifact.size_bytes),
                    artifact.published_at.format("%Y-%m-%d %H:%M").to_string(),
                    expires
                );
            }
            println!();
            println!("{} artifact(s)", artifacts.len());
        }
    }
    Ok(())
}

async fn prune_artifacts(store: &FsArtifactStore, all: bool, yes: bool) -> ShipyardResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    // Retention-based pruning is routine; wiping everything asks first
    if all {
        let count = store.list(None).await?.len();
        if count == 0 {
            ui::step_info(&ctx, "No artifacts to remove");
            return Ok(());
        }
        let question = format!("Remove all {} artifact(s), including unexpired ones?", count);
        if !ui::confirm(&ctx, &question, false).await? {
            ui::step_warn_hint(&ctx, "Aborted", "Pass --yes to skip the prompt");
            return Ok(());
        }
    }

    let removed = store.prune(Utc::now(), all).await?;
    if removed.is_empty() {
        ui::step_info(&ctx, "No expired artifacts");
        return Ok(());
    }

    let bytes: u64 = removed.iter().map(|a| a.size_bytes).sum();
    for artifact in &removed {
        ui::remark(&ctx, &format!("{}/{}", artifact.run_id, artifact.name));
    }
    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} artifact(s)", removed.len()),
        &format_bytes(bytes),
    );
    Ok(())
}
