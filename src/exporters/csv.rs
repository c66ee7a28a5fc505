//! CSV exporter: header row, then one row per workout.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::{header, Flattener};
use crate::error::ExportError;
use crate::store::WorkoutStore;

/// Write every stored workout, returning how many were written.
pub async fn write_csv<W: Write>(store: &WorkoutStore, writer: W) -> Result<usize, ExportError> {
  let flattener = Flattener::load(store).await?;
  let workouts = store.list_all().await?;

  let mut writer = csv::Writer::from_writer(writer);
  writer.write_record(header())?;
  for workout in &workouts {
    writer.write_record(flattener.as_list(workout))?;
  }
  writer.flush()?;

  Ok(workouts.len())
}

pub async fn export_csv(store: &WorkoutStore, path: &Path) -> Result<usize, ExportError> {
  let exported = write_csv(store, File::create(path)?).await?;
  tracing::info!(path = %path.display(), exported, "{} workouts exported", exported);
  Ok(exported)
}
