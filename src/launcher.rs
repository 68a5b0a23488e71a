use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::{Config, DatabaseUrl};
use crate::handoff::{self, LaunchError};
use crate::migrate::{self, MigrationError, MigrationOutcome, Migrator, SkipReason};
use crate::utils::logging::redact_url;

/// Runs the best-effort migration step, then replaces itself with the
/// service command.
pub struct Launcher {
    database_url: Option<DatabaseUrl>,
    migrator: Box<dyn Migrator>,
    migrations_enabled: bool,
}

impl Launcher {
    pub fn new(config: &Config, database_url: Option<DatabaseUrl>) -> Self {
        Self {
            database_url,
            migrator: migrate::from_config(&config.migration),
            migrations_enabled: config.migration.enabled,
        }
    }

    #[cfg(test)]
    pub fn with_migrator(database_url: Option<DatabaseUrl>, migrator: Box<dyn Migrator>) -> Self {
        Self {
            database_url,
            migrator,
            migrations_enabled: true,
        }
    }

    pub fn skip_migrations(mut self) -> Self {
        self.migrations_enabled = false;
        self
    }

    /// Never fails: a migration error is logged and reported as an outcome.
    pub async fn migrate(&self) -> MigrationOutcome {
        match self.migrate_strict().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("database migrations failed, continuing startup: {}", err);
                MigrationOutcome::Failed(err.to_string())
            }
        }
    }

    pub async fn migrate_strict(&self) -> Result<MigrationOutcome, MigrationError> {
        let Some(url) = &self.database_url else {
            debug!("no database url set, skipping migrations");
            return Ok(MigrationOutcome::Skipped(SkipReason::NoDatabaseUrl));
        };
        if !self.migrations_enabled {
            info!("migrations disabled, skipping");
            return Ok(MigrationOutcome::Skipped(SkipReason::Disabled));
        }

        info!(
            source = %url.source,
            target = %redact_url(url.value.expose_secret()),
            "running database migrations with {}",
            self.migrator.describe()
        );
        self.migrator.migrate(&url.value).await?;
        info!("database migrations finished");
        Ok(MigrationOutcome::Applied)
    }

    /// Returns only if the command could not be started, or, on platforms
    /// without process replacement, with the command's exit code.
    pub async fn launch(&self, argv: &[String]) -> Result<u8, LaunchError> {
        self.migrate().await;

        if let Some(program) = argv.first() {
            info!("handing off to {}", program);
        }
        handoff::hand_off(argv)
    }
}
