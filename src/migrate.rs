use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{MigrationConfig, MigrationKind};
use crate::db::{DatabaseError, DatabaseManager};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration command is empty")]
    EmptyCommand,
    #[error("failed to start migration command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("migration command {program} exited with {status}")]
    Failed { program: String, status: String },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// The one-shot schema upgrade run before hand-off. Implementations must be
/// idempotent: the launcher calls them on every start.
#[async_trait]
pub trait Migrator: Send + Sync {
    fn describe(&self) -> String;
    async fn migrate(&self, database_url: &SecretString) -> Result<(), MigrationError>;
}

pub fn from_config(config: &MigrationConfig) -> Box<dyn Migrator> {
    match (config.kind, &config.directory) {
        (MigrationKind::Sql, Some(directory)) => Box::new(SqlMigrator::new(directory.clone())),
        _ => Box::new(CommandMigrator::new(config.command.clone())),
    }
}

/// Runs an external migration tool, inheriting stdio and environment.
pub struct CommandMigrator {
    argv: Vec<String>,
}

impl CommandMigrator {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Migrator for CommandMigrator {
    fn describe(&self) -> String {
        format!("command `{}`", self.argv.join(" "))
    }

    async fn migrate(&self, _database_url: &SecretString) -> Result<(), MigrationError> {
        let (program, args) = self.argv.split_first().ok_or(MigrationError::EmptyCommand)?;
        debug!("running migration command {} {:?}", program, args);

        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|source| MigrationError::Spawn {
                program: program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(MigrationError::Failed {
                program: program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Applies `.sql` files from a directory through the built-in engine.
pub struct SqlMigrator {
    directory: PathBuf,
}

impl SqlMigrator {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Migrator for SqlMigrator {
    fn describe(&self) -> String {
        format!("sql migrations in {}", self.directory.display())
    }

    async fn migrate(&self, database_url: &SecretString) -> Result<(), MigrationError> {
        let manager = DatabaseManager::new(database_url)?;
        let applied = manager.migrate(&self.directory).await?;
        info!(
            "applied {} pending {:?} migration(s)",
            applied,
            manager.db_type()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Skipped(SkipReason),
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDatabaseUrl,
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoDatabaseUrl => write!(f, "no database url configured"),
            SkipReason::Disabled => write!(f, "migrations disabled"),
        }
    }
}
