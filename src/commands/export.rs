use std::path::Path;

use super::CommandError;
use crate::exporters;
use crate::store::WorkoutStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
  Csv,
  Json,
}

pub async fn run_export(
  store: &WorkoutStore,
  format: ExportFormat,
  path: &Path,
) -> Result<usize, CommandError> {
  let exported = match format {
    ExportFormat::Csv => exporters::csv::export_csv(store, path).await?,
    ExportFormat::Json => exporters::json::export_json(store, path).await?,
  };
  Ok(exported)
}
