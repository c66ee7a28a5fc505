use std::path::Path;

use super::CommandError;
use crate::config::SyncConfig;
use crate::importers::{self, ImportReport};
use crate::store::WorkoutStore;
use crate::strava;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportSource {
  Csv,
  Json,
  Strava,
}

/// Import from one source. File sources need `file`; Strava needs an access
/// token in the configuration.
pub async fn run_import(
  store: &WorkoutStore,
  config: &SyncConfig,
  source: ImportSource,
  file: Option<&Path>,
  reconcile: bool,
) -> Result<ImportReport, CommandError> {
  let report = match source {
    ImportSource::Csv => {
      let path = file.ok_or(CommandError::MissingFile("csv"))?;
      importers::csv::import_csv(store, path, reconcile).await?
    }
    ImportSource::Json => {
      let path = file.ok_or(CommandError::MissingFile("json"))?;
      importers::json::import_json(store, path, reconcile).await?
    }
    ImportSource::Strava => {
      let strava_config = config.strava()?;
      strava::import_strava(store, &strava_config, reconcile).await?
    }
  };

  if !reconcile {
    tracing::info!("Duplicate check deferred, run `check` to reconcile");
  }
  Ok(report)
}
