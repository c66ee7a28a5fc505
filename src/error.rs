//! Error types for the store, importers and exporters.
//!
//! Failures are converted into counters at the level that drives a batch
//! (import pipeline, batch checker); nothing here is meant to abort a run.

use crate::strava::StravaError;

/// A column value that could not be parsed into its attribute type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid value {value:?} for column '{column}': {reason}")]
pub struct AttributeError {
  pub column: String,
  pub value: String,
  pub reason: String,
}

/// ---------------------------------------------------------------------------
/// Store
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Workout not found: {0}")]
  WorkoutNotFound(i64),

  #[error("Could not allocate a unique id for a merged workout")]
  MergedIdExhausted,

  #[error("Failed to prepare database location: {0}")]
  Io(#[from] std::io::Error),
}

/// ---------------------------------------------------------------------------
/// Import / Export
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
  #[error("Failed to read import file: {0}")]
  Io(#[from] std::io::Error),

  #[error("CSV file not formatted correctly: {0}")]
  Csv(#[from] csv::Error),

  #[error("JSON file not formatted correctly: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Record {record}: {message}")]
  InvalidRecord { record: usize, message: String },

  #[error("Missing required column '{0}'")]
  MissingColumn(&'static str),

  #[error("Strava import failed: {0}")]
  Strava(#[from] StravaError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
  #[error("Failed to write export file: {0}")]
  Io(#[from] std::io::Error),

  #[error("CSV export failed: {0}")]
  Csv(#[from] csv::Error),

  #[error("JSON export failed: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_attribute_error_names_column() {
    let err = AttributeError {
      column: "average_hr".to_string(),
      value: "fast".to_string(),
      reason: "invalid digit found in string".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("average_hr"));
    assert!(message.contains("\"fast\""));
  }

  #[test]
  fn test_store_error_wraps_sqlx() {
    let err: StoreError = sqlx::Error::RowNotFound.into();
    assert!(err.to_string().starts_with("Database error"));
  }
}
