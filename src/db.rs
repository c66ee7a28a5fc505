use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::Path;

use crate::error::StoreError;

pub type DbPool = SqlitePool;

/// Open (creating if needed) the workouts database and run migrations.
///
/// The tool is strictly sequential, so a single connection is enough and
/// keeps transactions from waiting on a second pooled connection.
pub async fn initialize_db(db_path: &Path) -> Result<DbPool, StoreError> {
  if let Some(parent) = db_path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }

  let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
  tracing::info!(path = %db_path.display(), "Connecting to workouts database");

  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect(&db_url)
    .await?;

  run_migrations(&pool).await?;
  Ok(pool)
}

/// Open a private in-memory database, used by tests and dry runs.
pub async fn initialize_in_memory() -> Result<DbPool, StoreError> {
  // max_connections(1): every pooled connection to sqlite::memory: is a separate database
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await?;

  run_migrations(&pool).await?;
  Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
  sqlx::migrate!("./migrations").run(pool).await?;
  tracing::debug!("Database migrations applied");
  Ok(())
}
