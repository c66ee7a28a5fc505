//! JSON exporter: one array of flattened workout objects.

use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::Flattener;
use crate::error::ExportError;
use crate::store::WorkoutStore;

pub async fn write_json<W: Write>(store: &WorkoutStore, writer: W) -> Result<usize, ExportError> {
  let flattener = Flattener::load(store).await?;
  let workouts = store.list_all().await?;

  let records: Vec<Value> = workouts
    .iter()
    .map(|workout| Value::Object(flattener.as_map(workout)))
    .collect();

  let mut writer = BufWriter::new(writer);
  serde_json::to_writer(&mut writer, &records)?;
  writer.flush()?;

  Ok(records.len())
}

pub async fn export_json(store: &WorkoutStore, path: &Path) -> Result<usize, ExportError> {
  let exported = write_json(store, File::create(path)?).await?;
  tracing::info!(path = %path.display(), exported, "{} workouts exported", exported);
  Ok(exported)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::importers::json::read_json;
  use crate::test_utils::*;

  #[tokio::test]
  async fn test_json_export_reads_back() {
    let store = setup_test_store().await;
    let mut workout = new_workout("garmin", "7", 2, "2020-05-21 07:00:00", 1800);
    workout.attributes.average_hr = Some(151);
    workout.attributes.distance_m = Some(5012.5);
    store.insert(&workout).await.unwrap();

    let mut buffer = Vec::new();
    assert_eq!(write_json(&store, &mut buffer).await.unwrap(), 1);
    let text = String::from_utf8(buffer).unwrap();

    let records = read_json(&text).unwrap();
    let record = records[0].as_ref().unwrap();
    assert_eq!(record.source.as_deref(), Some("garmin"));
    assert_eq!(record.sportstype.as_deref(), Some("Running"));
    assert_eq!(record.attributes, workout.attributes);
  }

  #[tokio::test]
  async fn test_export_json_to_unwritable_path() {
    let store = setup_test_store().await;
    let result = export_json(&store, Path::new("/nonexistent/dir/out.json")).await;
    assert!(matches!(result, Err(ExportError::Io(_))));
  }
}
