//! Matrix command - show what a run would build

use crate::cli::args::{MatrixArgs, OutputFormat};
use crate::config::Config;
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::HostPolicy;
use crate::pipeline::{build_plan, PlanOptions};
use console::style;

/// Execute the matrix command
pub async fn execute(args: MatrixArgs, config: &Config) -> ShipyardResult<()> {
    let project_dir = match args.project {
        Some(p) => p,
        None => std::env::current_dir()
            .map_err(|e| ShipyardError::io("getting current directory", e))?,
    };
    let plan = build_plan(config, &project_dir, &PlanOptions::default())?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan.matrix)?),
        OutputFormat::Plain => {
            for entry in &plan.matrix {
                println!("{}", entry.target);
            }
        }
        OutputFormat::Table => {
            println!("{} {}", style("Binary:").bold(), plan.binary);
            println!(
                "{} debug build + tests, cache {}",
                style("Verify:").bold(),
                if plan.cache { "on" } else { "off" }
            );
            println!(
                "{} {} days retention, host policy {}",
                style("Release:").bold(),
                config.release.retention_days,
                match config.release.host_policy {
                    HostPolicy::All => "all",
                    HostPolicy::Native => "native",
                }
            );
            println!();
            println!(
                "{:<16} {:<28} {:<8} {}",
                style("HOST").bold(),
                style("TARGET").bold(),
                style("NATIVE").bold(),
                style("ARTIFACT PATH").bold()
            );
            println!("{}", "-".repeat(90));
            for entry in &plan.matrix {
                let native = if entry.host.is_native() {
                    style("yes     ").green()
                } else {
                    style("no      ").dim()
                };
                println!(
                    "{:<16} {:<28} {} {}",
                    entry.host.to_string(),
                    entry.target.as_str(),
                    native,
                    entry.artifact_path.display()
                );
            }
            println!();
            println!("{} target(s)", plan.matrix.len());
        }
    }

    Ok(())
}
