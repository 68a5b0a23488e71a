#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};

mod cli;
mod config;
mod db;
mod handoff;
mod launcher;
mod migrate;
mod utils;

use cli::Cli;
use config::Config;
use launcher::Launcher;
use migrate::MigrationOutcome;

/// sysexits.h EX_CONFIG
const EXIT_CONFIG: u8 = 78;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("service-launcher: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    utils::logging::init_tracing(&config.logging);
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let database_url = config.database.resolve_url(|key| std::env::var(key).ok());
    let mut launcher = Launcher::new(&config, database_url);
    if cli.skip_migrations {
        launcher = launcher.skip_migrations();
    }

    if cli.migrate_only {
        return match launcher.migrate_strict().await {
            Ok(MigrationOutcome::Skipped(reason)) => {
                warn!("nothing migrated: {}", reason);
                ExitCode::SUCCESS
            }
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("migration failed: {}", err);
                ExitCode::FAILURE
            }
        };
    }

    let command = if cli.command.is_empty() {
        config.handoff.command.clone()
    } else {
        cli.command
    };

    match launcher.launch(&command).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config".to_string(),
    })
}
