use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::db::migrations::{self, SqlMigration};
use crate::db::DatabaseError;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::connection::SimpleConnection;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::sql_types::Text;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::{Connection, QueryableByName, RunQueryDsl};

#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl DbType {
    pub fn detect(url: &str) -> Result<Self, DatabaseError> {
        if url.starts_with("sqlite:") {
            Ok(DbType::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DbType::Postgres)
        } else {
            let scheme = url.split_once(':').map(|(s, _)| s).unwrap_or("<none>");
            Err(DatabaseError::Unsupported(scheme.to_string()))
        }
    }
}

fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Backend-specific access to the migration history table.
pub trait MigrationConnection {
    fn ensure_history_table(&mut self) -> Result<(), DatabaseError>;
    fn applied_versions(&mut self) -> Result<BTreeSet<String>, DatabaseError>;
    /// Runs the migration and records it in one transaction.
    fn apply(&mut self, migration: &SqlMigration) -> Result<(), DatabaseError>;
}

pub fn run_pending<C: MigrationConnection>(
    conn: &mut C,
    migrations: &[SqlMigration],
) -> Result<usize, DatabaseError> {
    conn.ensure_history_table()?;
    let applied = conn.applied_versions()?;

    let mut count = 0;
    for migration in migrations.iter().filter(|m| !applied.contains(&m.version)) {
        info!(
            version = %migration.version,
            name = %migration.name,
            "applying migration"
        );
        conn.apply(migration)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
#[derive(QueryableByName)]
struct AppliedVersion {
    #[diesel(sql_type = Text)]
    version: String,
}

#[cfg(feature = "postgres")]
impl MigrationConnection for PgConnection {
    fn ensure_history_table(&mut self) -> Result<(), DatabaseError> {
        self.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS launcher_schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .map_err(|e| DatabaseError::Migration(e.to_string()))
    }

    fn applied_versions(&mut self) -> Result<BTreeSet<String>, DatabaseError> {
        let rows = diesel::sql_query("SELECT version FROM launcher_schema_migrations")
            .load::<AppliedVersion>(self)
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.version).collect())
    }

    fn apply(&mut self, migration: &SqlMigration) -> Result<(), DatabaseError> {
        self.transaction::<_, diesel::result::Error, _>(|conn| {
            conn.batch_execute(&migration.sql)?;
            diesel::sql_query("INSERT INTO launcher_schema_migrations (version) VALUES ($1)")
                .bind::<Text, _>(migration.version.clone())
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| {
            DatabaseError::Migration(format!("{}_{}: {e}", migration.version, migration.name))
        })
    }
}

#[cfg(feature = "sqlite")]
impl MigrationConnection for SqliteConnection {
    fn ensure_history_table(&mut self) -> Result<(), DatabaseError> {
        self.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS launcher_schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .map_err(|e| DatabaseError::Migration(e.to_string()))
    }

    fn applied_versions(&mut self) -> Result<BTreeSet<String>, DatabaseError> {
        let rows = diesel::sql_query("SELECT version FROM launcher_schema_migrations")
            .load::<AppliedVersion>(self)
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.version).collect())
    }

    fn apply(&mut self, migration: &SqlMigration) -> Result<(), DatabaseError> {
        self.transaction::<_, diesel::result::Error, _>(|conn| {
            conn.batch_execute(&migration.sql)?;
            diesel::sql_query("INSERT INTO launcher_schema_migrations (version) VALUES (?)")
                .bind::<Text, _>(migration.version.clone())
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| {
            DatabaseError::Migration(format!("{}_{}: {e}", migration.version, migration.name))
        })
    }
}

pub struct DatabaseManager {
    url: SecretString,
    db_type: DbType,
}

impl DatabaseManager {
    pub fn new(url: &SecretString) -> Result<Self, DatabaseError> {
        let db_type = DbType::detect(url.expose_secret())?;
        Ok(Self {
            url: SecretString::from(url.expose_secret().to_owned()),
            db_type,
        })
    }

    /// Applies every pending migration found in `dir` and returns how many ran.
    pub async fn migrate(&self, dir: &Path) -> Result<usize, DatabaseError> {
        let migrations = migrations::discover(dir)?;
        let url = self.url.expose_secret().to_owned();
        let db_type = self.db_type;

        tokio::task::spawn_blocking(move || match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let mut conn = PgConnection::establish(&url)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                run_pending(&mut conn, &migrations)
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let mut conn = SqliteConnection::establish(sqlite_path(&url))
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                run_pending(&mut conn, &migrations)
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}
