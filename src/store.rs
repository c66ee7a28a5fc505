//! Workout record store
//!
//! Persistence boundary for workouts: insert keyed by `(source, external_id)`,
//! lookups, and the overlap query the reconciliation engine runs on. A fresh
//! insert immediately triggers duplicate reconciliation for the new record.
//!
//! Row-level helpers take a `&mut SqliteConnection` so the reconciliation
//! engine can run them inside its own transaction.

use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::{NewWorkout, SyncState, TimeRange, Workout, WorkoutAttributes};
use crate::reconcile::{MergePolicy, ReconcileOutcome};

static INSERT_SQL: Lazy<String> = Lazy::new(|| {
  let columns = WorkoutAttributes::COLUMNS;
  format!(
    "INSERT INTO workouts (source, external_id, sportstype_id, sport_id, {}) VALUES (?, ?, ?, ?, {}) \
     ON CONFLICT(source, external_id) DO NOTHING",
    columns.join(", "),
    vec!["?"; columns.len()].join(", ")
  )
});

static UPDATE_SQL: Lazy<String> = Lazy::new(|| {
  let assignments: Vec<String> = WorkoutAttributes::COLUMNS
    .iter()
    .map(|column| format!("{} = ?", column))
    .collect();
  format!(
    "UPDATE workouts SET sportstype_id = ?, sport_id = ?, {} WHERE id = ?",
    assignments.join(", ")
  )
});

/// Result of [`WorkoutStore::insert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
  /// False when `(source, external_id)` was already stored
  pub created: bool,
  pub id: Option<i64>,
  /// None when not created, deferred, or reconciliation failed (logged)
  pub reconciliation: Option<ReconcileOutcome>,
}

/// ---------------------------------------------------------------------------
/// Store
/// ---------------------------------------------------------------------------

pub struct WorkoutStore {
  pool: DbPool,
  policy: MergePolicy,
}

impl WorkoutStore {
  pub fn new(pool: DbPool, policy: MergePolicy) -> Self {
    Self { pool, policy }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }

  pub fn policy(&self) -> &MergePolicy {
    &self.policy
  }

  /// Insert a workout unless its `(source, external_id)` is already stored,
  /// then reconcile it against overlapping workouts.
  ///
  /// Re-importing the same record is a no-op reporting `created: false`.
  /// A failed reconciliation leaves the inserted record unreconciled; it is
  /// logged and picked up again by the batch checker.
  pub async fn insert(&self, workout: &NewWorkout) -> Result<InsertOutcome, StoreError> {
    let mut outcome = self.insert_deferred(workout).await?;

    if let Some(id) = outcome.id {
      match self.handle_duplicates(id).await {
        Ok(reconciled) => outcome.reconciliation = Some(reconciled),
        Err(e) => {
          tracing::warn!(workout_id = id, error = %e, "Duplicate check failed, leaving workout unreconciled");
        }
      }
    }

    Ok(outcome)
  }

  /// Insert without triggering reconciliation (bulk restores; run the
  /// batch checker afterwards).
  pub async fn insert_deferred(&self, workout: &NewWorkout) -> Result<InsertOutcome, StoreError> {
    let mut conn = self.pool.acquire().await?;
    let id = insert_row(&mut conn, workout).await?;

    match id {
      Some(id) => {
        tracing::info!(
          workout_id = id,
          source = %workout.source,
          external_id = %workout.external_id,
          name = workout.attributes.name.as_deref().unwrap_or(""),
          "Adding new workout"
        );
        Ok(InsertOutcome {
          created: true,
          id: Some(id),
          reconciliation: None,
        })
      }
      None => {
        tracing::debug!(
          source = %workout.source,
          external_id = %workout.external_id,
          "Workout already imported"
        );
        Ok(InsertOutcome::default())
      }
    }
  }

  pub async fn get(&self, id: i64) -> Result<Option<Workout>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    fetch_workout(&mut conn, id).await
  }

  pub async fn find_by_key(
    &self,
    source: &str,
    external_id: &str,
  ) -> Result<Option<Workout>, StoreError> {
    let workout = sqlx::query_as::<_, Workout>(
      "SELECT * FROM workouts WHERE source = ?1 AND external_id = ?2",
    )
    .bind(source)
    .bind(external_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(workout)
  }

  /// Every workout, in store order.
  pub async fn list_all(&self) -> Result<Vec<Workout>, StoreError> {
    let workouts = sqlx::query_as::<_, Workout>("SELECT * FROM workouts ORDER BY id")
      .fetch_all(&self.pool)
      .await?;
    Ok(workouts)
  }

  pub async fn list_ids(&self) -> Result<Vec<i64>, StoreError> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM workouts ORDER BY id")
      .fetch_all(&self.pool)
      .await?;
    Ok(ids)
  }

  /// Workouts waiting for a human to adjudicate a cross-sport overlap.
  pub async fn list_manual_checks(&self) -> Result<Vec<Workout>, StoreError> {
    let workouts = sqlx::query_as::<_, Workout>(
      "SELECT * FROM workouts WHERE manual_check_required_with IS NOT NULL ORDER BY id",
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(workouts)
  }

  pub async fn count(&self) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workouts")
      .fetch_one(&self.pool)
      .await?;
    Ok(count)
  }

  /// Unsettled workouts whose interval intersects `range`, excluding `exclude_id`.
  pub async fn lookup_overlapping(
    &self,
    range: TimeRange,
    exclude_id: Option<i64>,
  ) -> Result<Vec<Workout>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    fetch_overlapping(&mut conn, range, exclude_id).await
  }

  /// -------------------------------------------------------------------------
  /// Sync state
  /// -------------------------------------------------------------------------

  pub async fn sync_state(&self, source: &str) -> Result<Option<SyncState>, StoreError> {
    let state = sqlx::query_as::<_, SyncState>("SELECT * FROM sync_state WHERE source = ?1")
      .bind(source)
      .fetch_optional(&self.pool)
      .await?;
    Ok(state)
  }

  pub async fn list_sync_states(&self) -> Result<Vec<SyncState>, StoreError> {
    let states = sqlx::query_as::<_, SyncState>("SELECT * FROM sync_state ORDER BY source")
      .fetch_all(&self.pool)
      .await?;
    Ok(states)
  }

  /// Record a finished sync; `last_activity_at` only ever moves forward.
  pub async fn record_sync(
    &self,
    source: &str,
    last_activity_at: Option<NaiveDateTime>,
  ) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO sync_state (source, last_sync_at, last_activity_at)
      VALUES (?1, ?2, ?3)
      ON CONFLICT(source) DO UPDATE SET
        last_sync_at = excluded.last_sync_at,
        last_activity_at = CASE
          WHEN sync_state.last_activity_at IS NULL THEN excluded.last_activity_at
          WHEN excluded.last_activity_at IS NULL THEN sync_state.last_activity_at
          WHEN excluded.last_activity_at > sync_state.last_activity_at THEN excluded.last_activity_at
          ELSE sync_state.last_activity_at
        END
      "#,
    )
    .bind(source)
    .bind(Utc::now())
    .bind(last_activity_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Row helpers
/// ---------------------------------------------------------------------------

pub(crate) async fn fetch_workout(
  conn: &mut SqliteConnection,
  id: i64,
) -> Result<Option<Workout>, StoreError> {
  let workout = sqlx::query_as::<_, Workout>("SELECT * FROM workouts WHERE id = ?1")
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
  Ok(workout)
}

/// Returns the new id, or `None` when the natural key already exists.
pub(crate) async fn insert_row(
  conn: &mut SqliteConnection,
  workout: &NewWorkout,
) -> Result<Option<i64>, StoreError> {
  let query = sqlx::query(INSERT_SQL.as_str())
    .bind(workout.source.clone())
    .bind(workout.external_id.clone())
    .bind(workout.sportstype_id)
    .bind(workout.sport_id);
  let result = workout.attributes.bind_all(query).execute(&mut *conn).await?;

  if result.rows_affected() == 0 {
    return Ok(None);
  }
  Ok(Some(result.last_insert_rowid()))
}

pub(crate) async fn fetch_overlapping(
  conn: &mut SqliteConnection,
  range: TimeRange,
  exclude_id: Option<i64>,
) -> Result<Vec<Workout>, StoreError> {
  // SQL narrows both ends with a second of slack; the exact half-open test
  // runs on the decoded rows
  let candidates = sqlx::query_as::<_, Workout>(
    r#"
    SELECT * FROM workouts
    WHERE is_duplicate_with IS NULL
      AND manual_check_required_with IS NULL
      AND start_time IS NOT NULL
      AND duration_sec IS NOT NULL
      AND start_time < ?1
      AND julianday(start_time) + duration_sec / 86400.0 > julianday(?3) - 1.0 / 86400.0
      AND (?2 IS NULL OR id != ?2)
    ORDER BY id
    "#,
  )
  .bind(range.end)
  .bind(exclude_id)
  .bind(range.start)
  .fetch_all(&mut *conn)
  .await?;

  Ok(
    candidates
      .into_iter()
      .filter(|w| w.time_range().is_some_and(|r| r.intersects(&range)))
      .collect(),
  )
}

pub(crate) async fn mark_duplicate(
  conn: &mut SqliteConnection,
  id: i64,
  canonical_id: i64,
) -> Result<(), StoreError> {
  sqlx::query("UPDATE workouts SET is_duplicate_with = ?1 WHERE id = ?2")
    .bind(canonical_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
  Ok(())
}

pub(crate) async fn mark_manual_check(
  conn: &mut SqliteConnection,
  id: i64,
  other_id: i64,
) -> Result<(), StoreError> {
  sqlx::query("UPDATE workouts SET manual_check_required_with = ?1 WHERE id = ?2")
    .bind(other_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
  Ok(())
}

/// Write back classification and attributes of a merged workout.
pub(crate) async fn update_merged(
  conn: &mut SqliteConnection,
  workout: &Workout,
) -> Result<(), StoreError> {
  let query = sqlx::query(UPDATE_SQL.as_str())
    .bind(workout.sportstype_id)
    .bind(workout.sport_id);
  workout
    .attributes
    .bind_all(query)
    .bind(workout.id)
    .execute(&mut *conn)
    .await?;
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
