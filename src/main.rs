//! Shipyard - Multi-target build and release pipeline
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use shipyard::cli::{Cli, Commands};
use shipyard::config::{Config, ConfigManager};
use shipyard::error::{ShipyardError, ShipyardResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ShipyardResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        return shipyard::cli::commands::completions(args);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| ShipyardError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    shipyard::ui::init_theme();

    debug!("Global config: {}", config_manager.path().display());
    match local_config_path {
        Some(ref path) => debug!("Local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => debug!("No local config found"),
    }

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Run(args) => shipyard::cli::commands::run(args, &config).await,
        Commands::Matrix(args) => shipyard::cli::commands::matrix(args, &config).await,
        Commands::Status => shipyard::cli::commands::status(&config).await,
        Commands::Runs(args) => shipyard::cli::commands::runs(args, &config).await,
        Commands::Cache(args) => shipyard::cli::commands::cache(args, &config).await,
        Commands::Artifacts(args) => shipyard::cli::commands::artifacts(args, &config).await,
        Commands::Config(args) => {
            shipyard::cli::commands::config(
                args,
                &config,
                &config_manager,
                local_config_path.as_deref(),
            )
            .await
        }
    }
}

/// 0 = warn (progress output only), 1 = info, 2+ = debug.
/// `RUST_LOG` overrides the level when set.
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("shipyard=warn"),
        1 => EnvFilter::new("shipyard=info"),
        _ => EnvFilter::new("shipyard=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
