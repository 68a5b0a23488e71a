use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use super::DatabaseError;

static MIGRATION_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<version>\d+)_(?P<name>[A-Za-z0-9_\-]+)\.sql$")
        .expect("migration file pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub version: String,
    pub name: String,
    pub sql: String,
    ordinal: u64,
}

impl SqlMigration {
    /// Parses `<digits>_<name>.sql`. Returns `None` for files that are not migrations.
    pub fn from_file_name(file_name: &str, sql: String) -> Option<Result<Self, DatabaseError>> {
        let captures = MIGRATION_FILE.captures(file_name)?;
        let version = captures["version"].to_string();
        let name = captures["name"].to_string();

        Some(
            version
                .parse::<u64>()
                .map(|ordinal| Self {
                    version: version.clone(),
                    name,
                    sql,
                    ordinal,
                })
                .map_err(|e| {
                    DatabaseError::Migration(format!("invalid migration version {version}: {e}"))
                }),
        )
    }
}

pub fn discover(dir: &Path) -> Result<Vec<SqlMigration>, DatabaseError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        DatabaseError::Migration(format!("cannot read {}: {e}", dir.display()))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatabaseError::Migration(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !MIGRATION_FILE.is_match(file_name) {
            debug!("skipping non-migration file {}", path.display());
            continue;
        }

        let sql = std::fs::read_to_string(&path).map_err(|e| {
            DatabaseError::Migration(format!("cannot read {}: {e}", path.display()))
        })?;
        if let Some(migration) = SqlMigration::from_file_name(file_name, sql) {
            migrations.push(migration?);
        }
    }

    migrations.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));

    if let Some(pair) = migrations
        .windows(2)
        .find(|pair| pair[0].ordinal == pair[1].ordinal)
    {
        return Err(DatabaseError::Migration(format!(
            "duplicate migration version {}: {} and {}",
            pair[1].version, pair[0].name, pair[1].name
        )));
    }

    Ok(migrations)
}
