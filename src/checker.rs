//! Batch duplicate checker
//!
//! Re-runs reconciliation over the whole store, for stores filled without
//! per-insert reconciliation (deferred imports, restored exports).

use serde::Serialize;

use crate::error::StoreError;
use crate::store::WorkoutStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
  /// Workouts visited
  pub examined: usize,
  /// Visited workouts already superseded or awaiting manual check
  pub skipped: usize,
  pub superseded: usize,
  pub merged_created: usize,
  pub manual_checks: usize,
  /// Reconciliation calls that failed and were rolled back
  pub failed: usize,
}

/// Reconcile every unsettled workout in id order.
///
/// Each workout is re-read right before its turn, since reconciling an
/// earlier one may have settled it. A failing workout is logged, counted
/// and left unreconciled; the run continues with the next one.
#[tracing::instrument(skip(store))]
pub async fn check_all(store: &WorkoutStore) -> Result<CheckReport, StoreError> {
  let mut report = CheckReport::default();

  for id in store.list_ids().await? {
    report.examined += 1;

    let Some(workout) = store.get(id).await? else {
      continue;
    };
    if workout.is_settled() {
      report.skipped += 1;
      continue;
    }

    match store.handle_duplicates(id).await {
      Ok(outcome) => {
        report.superseded += outcome.superseded;
        report.merged_created += outcome.merged_created;
        report.manual_checks += outcome.manual_checks;
      }
      Err(e) => {
        tracing::warn!(workout_id = id, error = %e, "Duplicate check failed, skipping workout");
        report.failed += 1;
      }
    }
  }

  tracing::info!(
    examined = report.examined,
    superseded = report.superseded,
    merged_created = report.merged_created,
    manual_checks = report.manual_checks,
    "Duplicate check finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ReconcileState;
  use crate::test_utils::*;

  async fn restore(store: &WorkoutStore) {
    for workout in [
      new_workout("csv", "0", 1, "2020-05-21 20:00:00", 600),
      new_workout("csv", "1", 1, "2020-05-21 19:58:00", 600),
      // running, overlaps only the second workout
      new_workout("csv", "3", 2, "2020-05-21 19:50:00", 540),
      new_workout("csv", "4", 1, "2020-05-22 20:11:00", 600),
    ] {
      store.insert_deferred(&workout).await.unwrap();
    }
  }

  #[tokio::test]
  async fn test_check_all_reconciles_restored_store() {
    let store = setup_test_store().await;
    restore(&store).await;

    let report = check_all(&store).await.unwrap();

    assert_eq!(report.merged_created, 1);
    assert_eq!(report.superseded, 2);
    // the second workout was settled by the first one's merge
    assert_eq!(report.skipped, 1);
    assert_eq!(report.manual_checks, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(store.count().await.unwrap(), 5);

    let states: Vec<ReconcileState> = store
      .list_all()
      .await
      .unwrap()
      .iter()
      .map(|w| w.state())
      .collect();
    let merged_id = store
      .list_all()
      .await
      .unwrap()
      .into_iter()
      .find(|w| w.is_merged())
      .unwrap()
      .id;
    assert_eq!(states[0], ReconcileState::Superseded(merged_id));
    assert_eq!(states[1], ReconcileState::Superseded(merged_id));
    assert_eq!(states[2], ReconcileState::NeedsManualCheck(merged_id));
    assert_eq!(states[3], ReconcileState::Unreconciled);
  }

  #[tokio::test]
  async fn test_second_check_changes_nothing() {
    let store = setup_test_store().await;
    restore(&store).await;
    check_all(&store).await.unwrap();
    let before: Vec<_> = store.list_all().await.unwrap().iter().map(|w| w.state()).collect();

    let report = check_all(&store).await.unwrap();

    assert_eq!(report.superseded, 0);
    assert_eq!(report.merged_created, 0);
    assert_eq!(report.manual_checks, 0);
    let after: Vec<_> = store.list_all().await.unwrap().iter().map(|w| w.state()).collect();
    assert_eq!(before, after);
  }

  #[tokio::test]
  async fn test_empty_store() {
    let store = setup_test_store().await;
    assert_eq!(check_all(&store).await.unwrap(), CheckReport::default());
  }
}
