//! Status command - check toolchain health and pipeline state

use crate::artifact::FsArtifactStore;
use crate::cache::{detect_lockfile, format_bytes, CacheStore, FsCacheStore};
use crate::config::{Config, ConfigManager};
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::{OsFamily, TargetTriple};
use crate::pipeline::record::{abbreviate, RunHistory};
use crate::pipeline::trigger::detect_git_head;
use crate::pipeline::{build_plan, PlanOptions};
use crate::toolchain::{CargoToolchain, Toolchain};
use chrono::Utc;
use console::{style, Emoji};
use std::process::Stdio;
use tokio::process::Command;

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// Execute the status command
pub async fn execute(config: &Config) -> ShipyardResult<()> {
    println!("{}", style("Shipyard Status").bold().blue());
    println!();

    let mut all_ok = true;

    println!("{}", style("Platform:").bold());
    println!("  {} OS: {:?}", CHECK, OsFamily::current());
    match TargetTriple::host() {
        Some(triple) => println!("  {} Host target: {}", CHECK, triple),
        None => {
            println!(
                "  {} {} - set project.reference_target",
                WARN,
                style("Unrecognized host target").yellow()
            );
        }
    }

    println!();
    println!("{}", style("Toolchain:").bold());
    all_ok &= check_tool("cargo", "https://rustup.rs").await;
    all_ok &= check_tool("rustc", "https://rustup.rs").await;
    let has_rustup = check_tool("rustup", "https://rustup.rs").await;
    all_ok &= has_rustup;

    let cwd = std::env::current_dir().map_err(|e| ShipyardError::io("getting current directory", e))?;

    println!();
    println!("{}", style("Release targets:").bold());
    match build_plan(config, &cwd, &PlanOptions::default()) {
        Ok(plan) => {
            let installed = if has_rustup {
                CargoToolchain::new(config.env.0.clone())
                    .installed_targets()
                    .await
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            for entry in &plan.matrix {
                if installed.contains(&entry.target) {
                    println!("  {} {} ({})", CHECK, entry.target, entry.host);
                } else {
                    println!(
                        "  {} {} ({}) - installed on first run",
                        WARN,
                        style(entry.target.as_str()).yellow(),
                        entry.host
                    );
                }
            }
        }
        Err(e) => {
            println!("  {} {} - {}", CROSS, style("Invalid matrix").red(), e);
            all_ok = false;
        }
    }

    println!();
    println!("{}", style("Project:").bold());
    match detect_git_head(&cwd).await {
        Ok((revision, branch)) => {
            let short = abbreviate(&revision);
            let triggers = config.trigger.branches.iter().any(|b| *b == branch);
            let note = if triggers { "" } else { " (not a trigger branch)" };
            println!("  {} {} @ {}{}", CHECK, branch, short, style(note).dim());
        }
        Err(_) => println!("  {} {}", WARN, style("Not a git checkout").yellow()),
    }
    match detect_lockfile(&cwd)? {
        Some(lock) => println!("  {} Cargo.lock (hash: {})", CHECK, lock.hash),
        None => println!("  {} {}", WARN, style("No Cargo.lock").yellow()),
    }

    println!();
    println!("{}", style("State:").bold());
    println!("  {} Directory: {}", CHECK, ConfigManager::state_dir().display());
    show_state().await?;

    println!();
    if all_ok {
        println!("{}", style("All critical checks passed").green().bold());
    } else {
        println!(
            "{}",
            style("Some checks failed - see above for details").yellow().bold()
        );
    }

    Ok(())
}

async fn check_tool(name: &str, install_hint: &str) -> bool {
    let result = Command::new(name)
        .arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let first_line = version.lines().next().unwrap_or("unknown");
            println!("  {} {}", CHECK, style(first_line.trim()).green());
            true
        }
        _ => {
            println!(
                "  {} {} - Not found. Install: {}",
                CROSS,
                style(name).red(),
                install_hint
            );
            false
        }
    }
}

async fn show_state() -> ShipyardResult<()> {
    let caches = FsCacheStore::new(ConfigManager::cache_dir()).list().await?;
    let cache_bytes: u64 = caches.iter().map(|c| c.size_bytes).sum();
    println!(
        "  {} Caches: {} ({})",
        CHECK,
        caches.len(),
        format_bytes(cache_bytes)
    );

    let now = Utc::now();
    let artifacts = FsArtifactStore::new(ConfigManager::artifacts_dir())
        .list(None)
        .await?;
    let expired = artifacts.iter().filter(|a| a.is_expired(now)).count();
    if expired > 0 {
        println!(
            "  {} Artifacts: {} ({} expired - run: shipyard artifacts prune)",
            WARN,
            artifacts.len(),
            expired
        );
    } else {
        println!("  {} Artifacts: {}", CHECK, artifacts.len());
    }

    let runs = RunHistory::with_dir(ConfigManager::runs_dir()).list().await?;
    match runs.first() {
        Some(last) => println!(
            "  {} Last run: {} {} ({})",
            CHECK,
            last.short_id(),
            last.status,
            last.created_at.format("%Y-%m-%d %H:%M")
        ),
        None => println!("  {} Last run: none", CHECK),
    }

    Ok(())
}
