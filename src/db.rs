pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;

pub mod error;
pub mod manager;
pub mod migrations;
