//! Duplicate reconciliation engine
//!
//! Decides whether a workout describes the same physical activity as other
//! stored workouts and, if so, folds them into one merged workout
//! (source [`MERGED_SOURCE`]) that supersedes every original.
//!
//! Per workout the states are:
//! - unreconciled: no bookkeeping set, eligible for reconciliation
//! - superseded: `is_duplicate_with` points at the merged workout (terminal)
//! - needs manual check: `manual_check_required_with` points at a
//!   time-overlapping workout of another sport (terminal)
//! - canonical: a merged workout, which keeps absorbing later duplicates
//!
//! A workout overlapping both another sport and same-sport duplicates gets
//! both fields: it is merged and superseded, and keeps the manual check
//! reference for whoever adjudicates the cross-sport conflict.
//!
//! Merging is fill-only: an attribute already set on the merged workout is
//! never overwritten, so the contributor that fills it first wins. Contributors
//! are folded in priority order (existing merge target, trainer app, trusted
//! source, then a stable tie-break), which makes the outcome independent of the
//! order the overlapping workouts were inserted in.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::cmp::Ordering;

use crate::error::StoreError;
use crate::models::{NewWorkout, Workout, MERGED_SOURCE};
use crate::store::{self, WorkoutStore};

/// Attempts at finding an unused external id for a merged workout.
const MERGED_ID_ATTEMPTS: u32 = 16;

/// ---------------------------------------------------------------------------
/// Policy & Outcome
/// ---------------------------------------------------------------------------

/// Which duplicates are trusted to lead a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
  /// Name substring of indoor-trainer app recordings (matched case-insensitively)
  pub trainer_app_marker: String,
  /// Source treated as the most complete (matched case-insensitively)
  pub trusted_source: String,
}

impl Default for MergePolicy {
  fn default() -> Self {
    Self {
      trainer_app_marker: "Zwift".to_string(),
      trusted_source: "Strava".to_string(),
    }
  }
}

impl MergePolicy {
  /// Lower rank leads. Merged workouts first, then trainer-app recordings,
  /// then the trusted source, then everything else.
  fn rank(&self, workout: &Workout) -> u8 {
    if workout.is_merged() {
      return 0;
    }
    let marker = self.trainer_app_marker.to_lowercase();
    let is_trainer_app = !marker.is_empty()
      && workout
        .attributes
        .name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(&marker));
    if is_trainer_app {
      return 1;
    }
    if workout.source.eq_ignore_ascii_case(&self.trusted_source) {
      return 2;
    }
    3
  }

  /// Total order used to pick the leading workout and the fold order.
  /// Equal ranks fall back to start time, then the natural key.
  fn compare(&self, a: &Workout, b: &Workout) -> Ordering {
    self
      .rank(a)
      .cmp(&self.rank(b))
      .then_with(|| a.attributes.start_time.cmp(&b.attributes.start_time))
      .then_with(|| a.source.cmp(&b.source))
      .then_with(|| a.external_id.cmp(&b.external_id))
      .then_with(|| a.id.cmp(&b.id))
  }
}

/// Counts produced by one reconciliation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
  /// Workouts marked as duplicates of a merged workout
  pub superseded: usize,
  /// 1 if a new merged workout was created, else 0
  pub merged_created: usize,
  /// 1 if the workout was escalated to manual check, else 0
  pub manual_checks: usize,
}

/// ---------------------------------------------------------------------------
/// Engine
/// ---------------------------------------------------------------------------

pub struct Reconciler<'p> {
  policy: &'p MergePolicy,
}

impl<'p> Reconciler<'p> {
  pub fn new(policy: &'p MergePolicy) -> Self {
    Self { policy }
  }

  /// Reconcile one workout against every unsettled workout overlapping it.
  ///
  /// Runs on the caller's connection; [`WorkoutStore::handle_duplicates`]
  /// wraps it in a transaction.
  #[tracing::instrument(skip(self, conn), level = "debug")]
  pub async fn handle_duplicates(
    &self,
    conn: &mut SqliteConnection,
    workout_id: i64,
  ) -> Result<ReconcileOutcome, StoreError> {
    let mut outcome = ReconcileOutcome::default();

    let workout = store::fetch_workout(conn, workout_id)
      .await?
      .ok_or(StoreError::WorkoutNotFound(workout_id))?;

    if workout.is_settled() {
      tracing::debug!(state = %workout.state(), "Workout already settled");
      return Ok(outcome);
    }

    let Some(range) = workout.time_range() else {
      tracing::debug!("Workout has no start time or duration, not checking for duplicates");
      return Ok(outcome);
    };

    let overlapping = store::fetch_overlapping(conn, range, Some(workout.id)).await?;
    if overlapping.is_empty() {
      return Ok(outcome);
    }

    let (same_sport, other_sport): (Vec<Workout>, Vec<Workout>) = overlapping
      .into_iter()
      .partition(|other| other.sport_id == workout.sport_id);

    // Cross-sport overlap is never auto-merged; a human decides. The other
    // sport's workouts drop out, same-sport duplicates are still merged.
    if let Some(conflict) = other_sport.last() {
      for other in &other_sport {
        tracing::warn!(
          other_id = other.id,
          other_sport_id = other.sport_id,
          sport_id = workout.sport_id,
          "Overlapping workout of another sport, manual check required"
        );
      }
      store::mark_manual_check(conn, workout.id, conflict.id).await?;
      outcome.manual_checks = 1;
    }

    if same_sport.is_empty() {
      return Ok(outcome);
    }
    let mut group = same_sport;
    group.push(workout);

    group.sort_by(|a, b| self.policy.compare(a, b));
    let mut group = group.into_iter();
    let Some(leader) = group.next() else {
      return Ok(outcome);
    };

    let mut merged = if leader.is_merged() {
      tracing::debug!(merged_id = leader.id, "Absorbing into existing merged workout");
      leader
    } else {
      let merged = create_merged(conn, &leader).await?;
      store::mark_duplicate(conn, leader.id, merged.id).await?;
      tracing::info!(
        merged_id = merged.id,
        leader_id = leader.id,
        leader_source = %leader.source,
        "Created merged workout"
      );
      outcome.merged_created = 1;
      outcome.superseded += 1;
      merged
    };

    for contributor in group {
      if contributor.is_duplicate_with == Some(merged.id) {
        continue;
      }
      let filled = merged.absorb(&contributor);
      store::mark_duplicate(conn, contributor.id, merged.id).await?;
      tracing::info!(
        workout_id = contributor.id,
        merged_id = merged.id,
        source = %contributor.source,
        filled,
        "Marked workout as duplicate"
      );
      outcome.superseded += 1;
    }

    store::update_merged(conn, &merged).await?;
    Ok(outcome)
  }
}

/// Insert a new merged workout seeded with the leader's classification and
/// attributes. Its external id is a nanosecond timestamp; the merged source
/// never collides with a real importer's natural key.
async fn create_merged(
  conn: &mut SqliteConnection,
  leader: &Workout,
) -> Result<Workout, StoreError> {
  let mut new = NewWorkout {
    source: MERGED_SOURCE.to_string(),
    external_id: String::new(),
    sportstype_id: leader.sportstype_id,
    sport_id: leader.sport_id,
    attributes: leader.attributes.clone(),
  };

  for attempt in 0..MERGED_ID_ATTEMPTS {
    new.external_id = merged_external_id(attempt);
    if let Some(id) = store::insert_row(conn, &new).await? {
      return store::fetch_workout(conn, id)
        .await?
        .ok_or(StoreError::WorkoutNotFound(id));
    }
  }

  Err(StoreError::MergedIdExhausted)
}

fn merged_external_id(attempt: u32) -> String {
  let stamp = Utc::now().format("%Y%m%d%H%M%S%9f");
  if attempt == 0 {
    stamp.to_string()
  } else {
    format!("{}-{}", stamp, attempt)
  }
}

/// ---------------------------------------------------------------------------
/// Store entry point
/// ---------------------------------------------------------------------------

impl WorkoutStore {
  /// Reconcile one workout inside a single transaction. On error nothing
  /// from this call is persisted and the workout stays unreconciled.
  pub async fn handle_duplicates(&self, workout_id: i64) -> Result<ReconcileOutcome, StoreError> {
    let mut tx = self.pool().begin().await?;
    let outcome = Reconciler::new(self.policy())
      .handle_duplicates(&mut *tx, workout_id)
      .await?;
    tx.commit().await?;

    if outcome != ReconcileOutcome::default() {
      tracing::debug!(
        workout_id,
        superseded = outcome.superseded,
        merged_created = outcome.merged_created,
        manual_checks = outcome.manual_checks,
        "Duplicate check finished"
      );
    }
    Ok(outcome)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
