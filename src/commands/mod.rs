//! CLI verbs: show, import, check, export.

pub mod export;
pub mod import;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use crate::checker::{check_all, CheckReport};
use crate::config::ConfigError;
use crate::error::{ExportError, ImportError, StoreError};
use crate::models::{ReconcileState, SyncState, Workout, DATETIME_FORMAT};
use crate::store::WorkoutStore;
use crate::taxonomy;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error("--file is required when importing from {0}")]
  MissingFile(&'static str),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Import(#[from] ImportError),

  #[error(transparent)]
  Export(#[from] ExportError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// ---------------------------------------------------------------------------
/// Show
/// ---------------------------------------------------------------------------

/// One line of `show` output.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutLine {
  pub id: i64,
  pub source: String,
  pub external_id: String,
  pub sportstype: Option<String>,
  pub name: Option<String>,
  pub start_time: Option<NaiveDateTime>,
  pub duration_sec: Option<i64>,
  pub state: ReconcileState,
}

impl fmt::Display for WorkoutLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let start = self
      .start_time
      .map(|t| t.format(DATETIME_FORMAT).to_string())
      .unwrap_or_else(|| "-".to_string());
    let duration = self
      .duration_sec
      .map(|d| format!("{}s", d))
      .unwrap_or_else(|| "-".to_string());
    write!(
      f,
      "{:>5}  {}  {:>7}  {:<18} {}/{}  '{}'  [{}]",
      self.id,
      start,
      duration,
      self.sportstype.as_deref().unwrap_or("-"),
      self.source,
      self.external_id,
      self.name.as_deref().unwrap_or(""),
      self.state
    )
  }
}

/// Workouts with their reconciliation state, optionally only those waiting
/// for a manual check.
pub async fn show_workouts(
  store: &WorkoutStore,
  manual_check_only: bool,
) -> Result<Vec<WorkoutLine>, CommandError> {
  let names = taxonomy::sportstype_names(store.pool()).await?;
  let workouts = if manual_check_only {
    store.list_manual_checks().await?
  } else {
    store.list_all().await?
  };

  Ok(
    workouts
      .into_iter()
      .map(|workout: Workout| WorkoutLine {
        id: workout.id,
        state: workout.state(),
        sportstype: workout.sportstype_id.and_then(|id| names.get(&id).cloned()),
        source: workout.source,
        external_id: workout.external_id,
        name: workout.attributes.name,
        start_time: workout.attributes.start_time,
        duration_sec: workout.attributes.duration_sec,
      })
      .collect(),
  )
}

pub async fn get_sync_state(store: &WorkoutStore) -> Result<Vec<SyncState>, CommandError> {
  Ok(store.list_sync_states().await?)
}

/// ---------------------------------------------------------------------------
/// Check
/// ---------------------------------------------------------------------------

pub async fn run_check(store: &WorkoutStore) -> Result<CheckReport, CommandError> {
  Ok(check_all(store).await?)
}
