use super::ConfigError;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub migration: MigrationConfig,
    pub handoff: HandoffConfig,
    pub logging: LoggingConfig,
    /// Problems found while applying overrides, logged once tracing is up.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Variables consulted in order; the first non-empty one gates migrations.
    #[serde(default = "default_database_env_vars")]
    pub env_vars: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            env_vars: default_database_env_vars(),
        }
    }
}

/// A database connection string taken from the environment. Only its
/// presence matters to the launcher; the value is passed on untouched.
#[derive(Debug)]
pub struct DatabaseUrl {
    pub source: String,
    pub value: SecretString,
}

impl DatabaseConfig {
    pub fn resolve_url<F>(&self, lookup: F) -> Option<DatabaseUrl>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.env_vars.iter().find_map(|name| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .map(|value| DatabaseUrl {
                    source: name.clone(),
                    value: SecretString::from(value),
                })
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    #[default]
    Command,
    Sql,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    #[serde(default = "default_migration_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: MigrationKind,
    #[serde(default = "default_migration_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: default_migration_enabled(),
            kind: MigrationKind::default(),
            command: default_migration_command(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HandoffConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::from_env(|key| std::env::var(key).ok())),
        }
    }

    /// Defaults plus environment overrides. Never fails: an unknown log
    /// format falls back to `pretty` with a warning.
    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env_overrides(lookup);
        if !is_known_log_format(&config.logging.format) {
            config.warnings.push(format!(
                "unknown log format {}, using pretty",
                config.logging.format
            ));
            config.logging.format = default_log_format();
        }
        config
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.migration.kind {
            MigrationKind::Command if self.migration.command.is_empty() => {
                return Err(ConfigError::InvalidConfig(
                    "migration.command cannot be empty".to_string(),
                ));
            }
            MigrationKind::Sql if self.migration.directory.is_none() => {
                return Err(ConfigError::InvalidConfig(
                    "migration.directory is required when migration.kind is sql".to_string(),
                ));
            }
            _ => {}
        }

        if self.database.env_vars.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.env_vars cannot be empty".to_string(),
            ));
        }

        if !is_known_log_format(&self.logging.format) {
            return Err(ConfigError::InvalidConfig(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let command = lookup("LAUNCHER_MIGRATE_COMMAND")
            .map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());
        let directory = lookup("LAUNCHER_MIGRATIONS_DIR").filter(|value| !value.trim().is_empty());

        // The migrations directory wins over a migration command.
        if let Some(command) = command {
            if directory.is_some() {
                self.warnings.push(
                    "LAUNCHER_MIGRATIONS_DIR is set, ignoring LAUNCHER_MIGRATE_COMMAND".to_string(),
                );
            }
            self.migration.command = command;
            self.migration.kind = MigrationKind::Command;
        }
        if let Some(directory) = directory {
            self.migration.directory = Some(PathBuf::from(directory));
            self.migration.kind = MigrationKind::Sql;
        }
        if let Some(value) = lookup("LAUNCHER_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("LAUNCHER_LOG_FORMAT") {
            self.logging.format = value.trim().to_ascii_lowercase();
        }
    }
}

fn is_known_log_format(format: &str) -> bool {
    matches!(format, "pretty" | "json")
}

fn default_database_env_vars() -> Vec<String> {
    vec!["DATABASE_URL".to_string(), "DATABASE_URI".to_string()]
}

fn default_migration_enabled() -> bool {
    true
}

fn default_migration_command() -> Vec<String> {
    vec!["flask".to_string(), "db".to_string(), "upgrade".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
