pub use self::parser::{Config, DatabaseUrl, LoggingConfig, MigrationConfig, MigrationKind};
pub use self::validator::ConfigError;

mod parser;
mod validator;
