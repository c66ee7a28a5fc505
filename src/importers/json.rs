//! JSON importer: an array of objects keyed like the CSV columns.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::{import_records, ImportReport, WorkoutRecord, JSON_SOURCE};
use crate::error::ImportError;
use crate::store::WorkoutStore;

/// Parse a JSON document. A document that is not an array of objects fails
/// as a whole; an object with bad values becomes an `Err` entry.
pub fn read_json(data: &str) -> Result<Vec<Result<WorkoutRecord, ImportError>>, ImportError> {
  let objects: Vec<Map<String, Value>> = serde_json::from_str(data)?;

  let records = objects
    .iter()
    .enumerate()
    .map(|(idx, object)| {
      let fields: Vec<(&str, String)> = object
        .iter()
        .map(|(key, value)| (key.as_str(), value_text(value)))
        .collect();
      WorkoutRecord::from_fields(
        idx + 1,
        fields.iter().map(|(key, value)| (*key, value.as_str())),
      )
    })
    .collect();

  Ok(records)
}

fn value_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

pub async fn import_json(
  store: &WorkoutStore,
  path: &Path,
  reconcile: bool,
) -> Result<ImportReport, ImportError> {
  tracing::info!(path = %path.display(), "Importing workouts from JSON");
  let data = fs::read_to_string(path)?;
  let records = read_json(&data)?;
  Ok(import_records(store, records, JSON_SOURCE, reconcile).await)
}
