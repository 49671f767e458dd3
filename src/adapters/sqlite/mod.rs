//! SQLite database adapters for the scheduler.

pub mod bot_repository;
pub mod connection;
pub mod migrations;
pub mod request_repository;
pub mod result_repository;
pub mod to_run_repository;
pub mod transactional_store;

pub use bot_repository::SqliteBotRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use request_repository::SqliteRequestRepository;
pub use result_repository::SqliteResultRepository;
pub use to_run_repository::SqliteToRunRepository;
pub use transactional_store::SqliteTransactionalStore;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::error::SchedulerError;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> Result<Uuid, SchedulerError> {
    Uuid::parse_str(s).map_err(|e| SchedulerError::Validation(format!("corrupt uuid column: {e}")))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SchedulerError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Validation(format!("corrupt datetime column: {e}")))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, None).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

pub async fn initialize_default_database() -> Result<SqlitePool, DatabaseError> {
    initialize_database("sqlite:.swarmd/swarmd.db").await
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
