//! CSV importer: a header row naming the columns, one workout per row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::{import_records, ImportReport, WorkoutRecord, CSV_SOURCE};
use crate::error::ImportError;
use crate::store::WorkoutStore;

/// Parse every row. A malformed row becomes an `Err` entry so the rest of
/// the file still imports; a missing or unreadable header fails the file.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Result<WorkoutRecord, ImportError>>, ImportError> {
  let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
  let headers = reader.headers()?.clone();

  if !headers.iter().any(|h| h.trim() == "id") {
    return Err(ImportError::MissingColumn("id"));
  }

  let records = reader
    .records()
    .enumerate()
    .map(|(idx, row)| {
      let row = row?;
      tracing::trace!(record = idx + 1, ?row, "CSV record");
      WorkoutRecord::from_fields(idx + 1, headers.iter().zip(row.iter()))
    })
    .collect();

  Ok(records)
}

pub async fn import_csv(
  store: &WorkoutStore,
  path: &Path,
  reconcile: bool,
) -> Result<ImportReport, ImportError> {
  tracing::info!(path = %path.display(), "Importing workouts from CSV");
  let records = read_csv(File::open(path)?)?;
  Ok(import_records(store, records, CSV_SOURCE, reconcile).await)
}
