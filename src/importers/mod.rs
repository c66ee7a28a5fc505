//! Importers
//!
//! Every source (CSV file, JSON file, Strava) produces [`WorkoutRecord`]s;
//! [`import_records`] classifies them, stores them and reconciles each new
//! workout against what is already in the store.

pub mod csv;
pub mod json;

use serde::Serialize;

use crate::error::ImportError;
use crate::models::{NewWorkout, WorkoutAttributes};
use crate::store::WorkoutStore;
use crate::taxonomy;

/// Source name given to CSV records without a `source` column.
pub const CSV_SOURCE: &str = "CSV import";
/// Source name given to JSON records without a `source` key.
pub const JSON_SOURCE: &str = "JSON import";

/// A workout as delivered by an importer, before classification and storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutRecord {
  /// Overrides the importer's default source
  pub source: Option<String>,
  pub external_id: String,
  /// Vendor activity label, normalized through the taxonomy
  pub sportstype: Option<String>,
  pub attributes: WorkoutAttributes,
}

impl WorkoutRecord {
  /// Build a record from `(column, text)` pairs.
  ///
  /// `id` is the external id, `sportstype` the vendor label and `source`
  /// the optional source override; every other known column is an
  /// attribute. Empty cells are null, unknown columns are ignored.
  /// `record` numbers the record in error messages.
  pub fn from_fields<'a, I>(record: usize, fields: I) -> Result<Self, ImportError>
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut parsed = WorkoutRecord::default();

    for (column, raw) in fields {
      let value = raw.trim();
      match column.trim() {
        "id" => parsed.external_id = value.to_string(),
        "source" => parsed.source = non_empty(value),
        "sportstype" => parsed.sportstype = non_empty(value),
        column => {
          let known = parsed
            .attributes
            .set_column(column, value)
            .map_err(|e| ImportError::InvalidRecord {
              record,
              message: e.to_string(),
            })?;
          if !known {
            tracing::trace!(column, "Ignoring unknown column");
          }
        }
      }
    }

    if parsed.external_id.is_empty() {
      return Err(ImportError::InvalidRecord {
        record,
        message: "missing id".to_string(),
      });
    }

    Ok(parsed)
  }
}

fn non_empty(value: &str) -> Option<String> {
  if value.is_empty() {
    None
  } else {
    Some(value.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Import pipeline
/// ---------------------------------------------------------------------------

/// Counters of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  /// Records delivered by the source, valid or not
  pub fetched: usize,
  /// Newly stored workouts
  pub imported: usize,
  /// Records whose `(source, id)` was already stored
  pub already_present: usize,
  /// Invalid records and records that could not be classified or stored
  pub failed: usize,
  pub superseded: usize,
  pub merged_created: usize,
  pub manual_checks: usize,
}

impl ImportReport {
  pub fn merge(&mut self, other: &ImportReport) {
    self.fetched += other.fetched;
    self.imported += other.imported;
    self.already_present += other.already_present;
    self.failed += other.failed;
    self.superseded += other.superseded;
    self.merged_created += other.merged_created;
    self.manual_checks += other.manual_checks;
  }
}

/// Classify and store every record; with `reconcile` each new workout is
/// checked for duplicates right away, otherwise that is left to the batch
/// checker. A failing record is logged and counted, never fatal.
#[tracing::instrument(skip(store, records))]
pub async fn import_records<I>(
  store: &WorkoutStore,
  records: I,
  default_source: &str,
  reconcile: bool,
) -> ImportReport
where
  I: IntoIterator<Item = Result<WorkoutRecord, ImportError>>,
{
  let mut report = ImportReport::default();

  for record in records {
    report.fetched += 1;

    let record = match record {
      Ok(record) => record,
      Err(e) => {
        tracing::error!(error = %e, "Skipping invalid record");
        report.failed += 1;
        continue;
      }
    };

    match import_one(store, record, default_source, reconcile).await {
      Ok(outcome) if outcome.created => {
        report.imported += 1;
        if let Some(reconciled) = outcome.reconciliation {
          report.superseded += reconciled.superseded;
          report.merged_created += reconciled.merged_created;
          report.manual_checks += reconciled.manual_checks;
        }
      }
      Ok(_) => report.already_present += 1,
      Err(e) => {
        tracing::error!(error = %e, "Failed to import record");
        report.failed += 1;
      }
    }
  }

  tracing::info!(
    fetched = report.fetched,
    imported = report.imported,
    "{} workouts fetched and {} workouts imported",
    report.fetched,
    report.imported
  );
  report
}

async fn import_one(
  store: &WorkoutStore,
  record: WorkoutRecord,
  default_source: &str,
  reconcile: bool,
) -> Result<crate::store::InsertOutcome, ImportError> {
  let name = record.attributes.name.as_deref();
  // Unlabeled records are classified by name like the "other" bucket;
  // without a name either they stay unclassified
  let label = match (record.sportstype.as_deref(), name) {
    (Some(label), _) => Some(label),
    (None, Some(_)) => Some(""),
    (None, None) => None,
  };

  let (sportstype_id, sport_id) = match label {
    Some(label) => {
      let resolved = taxonomy::resolve_sportstype(store.pool(), label, name).await?;
      (Some(resolved.sportstype.id), Some(resolved.sport.id))
    }
    None => (None, None),
  };

  let workout = NewWorkout {
    source: record.source.unwrap_or_else(|| default_source.to_string()),
    external_id: record.external_id,
    sportstype_id,
    sport_id,
    attributes: record.attributes,
  };

  let outcome = if reconcile {
    store.insert(&workout).await?
  } else {
    store.insert_deferred(&workout).await?
  };
  Ok(outcome)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::ReconcileState;
  use crate::test_utils::*;

  #[test]
  fn test_from_fields_maps_special_columns() {
    let record = WorkoutRecord::from_fields(
      1,
      [
        ("id", "17"),
        ("sportstype", "Running"),
        ("source", ""),
        ("name", "Lunch Run"),
        ("start_time", "2020-05-21 12:00:00"),
        ("duration_sec", "1800"),
        ("average_hr", ""),
        ("favourite_color", "blue"),
      ],
    )
    .unwrap();

    assert_eq!(record.external_id, "17");
    assert_eq!(record.sportstype.as_deref(), Some("Running"));
    assert_eq!(record.source, None);
    assert_eq!(record.attributes.name.as_deref(), Some("Lunch Run"));
    assert_eq!(record.attributes.duration_sec, Some(1800));
    assert_eq!(record.attributes.average_hr, None);
  }

  #[test]
  fn test_from_fields_requires_id() {
    let result = WorkoutRecord::from_fields(3, [("name", "No id")]);
    assert!(matches!(result, Err(ImportError::InvalidRecord { record: 3, .. })));
  }

  #[test]
  fn test_from_fields_reports_bad_values() {
    let result = WorkoutRecord::from_fields(2, [("id", "1"), ("start_time", "yesterday")]);
    match result {
      Err(ImportError::InvalidRecord { record, message }) => {
        assert_eq!(record, 2);
        assert!(message.contains("start_time"));
      }
      other => panic!("Expected invalid record, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_import_counts_and_defaults_source() {
    let store = setup_test_store().await;
    let records = vec![
      Ok(mock_record("1", "Ride", "2020-05-21 20:00:00", 600)),
      Ok(mock_record("2", "Run", "2020-05-22 07:00:00", 1800)),
      Err(ImportError::InvalidRecord {
        record: 3,
        message: "missing id".to_string(),
      }),
    ];

    let report = import_records(&store, records, CSV_SOURCE, true).await;

    assert_eq!(report.fetched, 3);
    assert_eq!(report.imported, 2);
    assert_eq!(report.failed, 1);
    let stored = store.find_by_key(CSV_SOURCE, "2").await.unwrap().unwrap();
    assert_eq!(stored.sport_id, Some(2));
    assert_eq!(stored.sportstype_id, Some(2));
  }

  #[tokio::test]
  async fn test_reimport_imports_nothing() {
    let store = setup_test_store().await;
    let records = || vec![Ok(mock_record("1", "Ride", "2020-05-21 20:00:00", 600))];

    let first = import_records(&store, records(), JSON_SOURCE, true).await;
    let second = import_records(&store, records(), JSON_SOURCE, true).await;

    assert_eq!((first.fetched, first.imported), (1, 1));
    assert_eq!((second.fetched, second.imported), (1, 0));
    assert_eq!(second.already_present, 1);
    assert_eq!(store.count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_import_reconciles_overlaps() {
    let store = setup_test_store().await;
    let mut garmin = mock_record("g1", "cycling", "2020-05-21 20:00:00", 600);
    garmin.source = Some("garmin".to_string());
    let records = vec![
      Ok(garmin),
      Ok(mock_record("c1", "Ride", "2020-05-21 19:58:00", 600)),
    ];

    let report = import_records(&store, records, CSV_SOURCE, true).await;

    assert_eq!(report.imported, 2);
    assert_eq!(report.merged_created, 1);
    assert_eq!(report.superseded, 2);
    assert_eq!(store.count().await.unwrap(), 3);
  }

  #[tokio::test]
  async fn test_deferred_import_leaves_overlaps_unreconciled() {
    let store = setup_test_store().await;
    let records = vec![
      Ok(mock_record("1", "Ride", "2020-05-21 20:00:00", 600)),
      Ok(mock_record("2", "Ride", "2020-05-21 19:58:00", 600)),
    ];

    let report = import_records(&store, records, CSV_SOURCE, false).await;

    assert_eq!(report.imported, 2);
    assert_eq!(report.merged_created, 0);
    for workout in store.list_all().await.unwrap() {
      assert_eq!(workout.state(), ReconcileState::Unreconciled);
    }
  }

  #[tokio::test]
  async fn test_record_without_label_is_unclassified() {
    let store = setup_test_store().await;
    let mut record = mock_record("1", "", "2020-05-21 20:00:00", 600);
    record.sportstype = None;

    let report = import_records(&store, vec![Ok(record)], CSV_SOURCE, true).await;

    assert_eq!(report.imported, 1);
    let stored = store.find_by_key(CSV_SOURCE, "1").await.unwrap().unwrap();
    assert_eq!(stored.sportstype_id, None);
    assert_eq!(stored.sport_id, None);
  }

  #[tokio::test]
  async fn test_record_without_label_is_classified_by_name() {
    let store = setup_test_store().await;
    let mut yoga = mock_record("1", "", "2020-05-21 07:00:00", 1800);
    yoga.sportstype = None;
    yoga.attributes.name = Some("Morning Yoga".to_string());
    let mut brunch = mock_record("2", "", "2020-05-21 11:00:00", 3600);
    brunch.sportstype = None;
    brunch.attributes.name = Some("Brunch".to_string());

    let report = import_records(&store, vec![Ok(yoga), Ok(brunch)], CSV_SOURCE, true).await;
    assert_eq!(report.imported, 2);

    let yoga = store.find_by_key(CSV_SOURCE, "1").await.unwrap().unwrap();
    let fitness = taxonomy::find_sport(store.pool(), "Fitness").await.unwrap().unwrap();
    assert_eq!(yoga.sport_id, Some(fitness.id));
    let yoga_type = taxonomy::find_sportstype(store.pool(), "Yoga").await.unwrap().unwrap();
    assert_eq!(yoga.sportstype_id, Some(yoga_type.id));

    let brunch = store.find_by_key(CSV_SOURCE, "2").await.unwrap().unwrap();
    let other = taxonomy::find_sport(store.pool(), "Other").await.unwrap().unwrap();
    assert_eq!(brunch.sport_id, Some(other.id));
  }
}
