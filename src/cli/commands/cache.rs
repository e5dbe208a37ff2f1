//! Cache command - manage per-target build caches

use crate::cache::{detect_lockfile, format_bytes, CacheEntry, CacheKey, CacheStore, FsCacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::plan::resolve_reference_target;
use crate::pipeline::{build_plan, PlanOptions};
use crate::ui::{self, TaskSpinner, UiContext};
use chrono::Utc;
use console::style;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ShipyardResult<()> {
    let store = FsCacheStore::new(ConfigManager::cache_dir());

    match args.action {
        CacheAction::List { format } => list_caches(&store, format).await,
        CacheAction::Info { project } => show_project_info(&store, project, config).await,
        CacheAction::Gc { days, dry_run } => gc_caches(&store, config, days, dry_run).await,
        CacheAction::Clear { keys, all, yes } => clear_caches(&store, keys, all, yes).await,
    }
}

/// List all saved caches
async fn list_caches(store: &dyn CacheStore, format: OutputFormat) -> ShipyardResult<()> {
    let caches = store.list().await?;

    if caches.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No caches found."),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_cache_table(&caches),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&caches)?),
        OutputFormat::Plain => {
            for cache in &caches {
                println!("{}", cache.key);
            }
        }
    }

    Ok(())
}

fn print_cache_table(caches: &[CacheEntry]) {
    println!(
        "{:<36} {:<10} {:<14} {:<20}",
        "KEY", "SIZE", "LOCK HASH", "SAVED"
    );
    println!("{}", "-".repeat(80));

    for cache in caches {
        println!(
            "{:<36} {:<10} {:<14} {:<20}",
            cache.key.as_str(),
            format_bytes(cache.size_bytes),
            cache.lock_hash.as_deref().unwrap_or("-"),
            cache.saved_at.format("%Y-%m-%d %H:%M").to_string()
        );
    }

    let total: u64 = caches.iter().map(|c| c.size_bytes).sum();
    println!();
    println!("Total: {} cache(s), {}", caches.len(), format_bytes(total));
}

/// Show which caches the next run of a project would restore
async fn show_project_info(
    store: &dyn CacheStore,
    project: Option<PathBuf>,
    config: &Config,
) -> ShipyardResult<()> {
    let project_dir = match project {
        Some(p) => p.canonicalize().unwrap_or(p),
        None => env::current_dir().map_err(|e| ShipyardError::io("getting current directory", e))?,
    };

    println!("Project: {}", project_dir.display());

    let lock = detect_lockfile(&project_dir)?;
    match lock {
        Some(ref info) => println!("Cargo.lock hash: {}", info.hash),
        None => println!("No Cargo.lock in this project."),
    }
    println!();

    let plan = build_plan(config, &project_dir, &PlanOptions::default())?;
    let saved = store.list().await?;

    let mut keys = vec![CacheKey::for_verify(&resolve_reference_target(config)?)];
    keys.extend(plan.matrix.iter().map(|e| CacheKey::for_target(&e.target)));

    println!("Cache status:");
    for key in keys {
        let (symbol, state) = match saved.iter().find(|c| c.key == key) {
            Some(entry) => {
                let current = match (&entry.lock_hash, &lock) {
                    (Some(saved_hash), Some(info)) => *saved_hash == info.hash,
                    _ => true,
                };
                if current {
                    (style("✓").green(), format!("hit ({})", format_bytes(entry.size_bytes)))
                } else {
                    (
                        style("~").yellow(),
                        "stale (built from an older Cargo.lock)".to_string(),
                    )
                }
            }
            None => (style("○").dim(), "miss (saved after next run)".to_string()),
        };
        println!("  {} {} [{}]", symbol, key, state);
    }

    Ok(())
}

/// Remove caches not saved within the last N days
async fn gc_caches(
    store: &dyn CacheStore,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> ShipyardResult<()> {
    let gc_days = days_override.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let caches = store.list().await?;
    let to_remove: Vec<&CacheEntry> = caches
        .iter()
        .filter(|c| c.is_older_than_days(gc_days))
        .collect();

    if to_remove.is_empty() {
        println!("No caches older than {} days.", gc_days);
        return Ok(());
    }

    println!(
        "Found {} cache(s) older than {} days:",
        to_remove.len(),
        gc_days
    );
    for cache in &to_remove {
        let age_days = (Utc::now() - cache.saved_at).num_days();
        println!("  {} {} ({} days old)", style("•").red(), cache.key, age_days);
    }

    if dry_run {
        println!();
        println!("Dry run - no caches removed.");
        return Ok(());
    }

    let mut spinner = TaskSpinner::new(&UiContext::detect());
    spinner.start("Removing stale caches...");
    let mut removed = 0;
    for cache in to_remove {
        debug!("Removing cache: {}", cache.key);
        match store.remove(&cache.key).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                spinner.stop_error(&format!("Failed to remove {}", cache.key));
                return Err(e);
            }
        }
    }
    spinner.stop(&format!("Removed {} cache(s)", removed));
    Ok(())
}

/// Remove the named caches, or every cache with `--all`
async fn clear_caches(
    store: &dyn CacheStore,
    keys: Vec<String>,
    all: bool,
    yes: bool,
) -> ShipyardResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let targets: Vec<CacheKey> = if all {
        store.list().await?.into_iter().map(|c| c.key).collect()
    } else {
        keys.iter()
            .map(|k| CacheKey::parse(k))
            .collect::<ShipyardResult<_>>()?
    };

    if targets.is_empty() {
        println!("No caches to clear.");
        return Ok(());
    }

    println!("This will remove {} cache(s):", targets.len());
    for key in &targets {
        println!("  {} {}", style("•").red(), key);
    }
    println!();

    if !ui::confirm(&ctx, "Remove these caches?", false).await? {
        ui::step_warn_hint(&ctx, "Aborted", "Pass --yes to skip the prompt");
        return Ok(());
    }

    let mut removed = 0;
    for key in &targets {
        if store.remove(key).await? {
            removed += 1;
        } else {
            ui::step_warn(&ctx, &format!("No cache saved for {}", key));
        }
    }

    ui::step_ok(&ctx, &format!("Cleared {} cache(s)", removed));
    Ok(())
}
