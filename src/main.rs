//! workout-sync: import workouts from Strava, CSV or JSON into a local
//! database, merge duplicates and export the result.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use workout_sync_lib::commands::{self, export::ExportFormat, import::ImportSource};
use workout_sync_lib::config::SyncConfig;
use workout_sync_lib::db;
use workout_sync_lib::store::WorkoutStore;

#[derive(Parser, Debug)]
#[command(name = "workout-sync", version)]
#[command(about = "Sync workouts into a local database and merge duplicates")]
struct Args {
  /// Increase verbosity, from -v (ERROR) over -vv (WARN), -vvv (INFO) to -vvvv (DEBUG)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Workouts database (defaults to WORKOUT_SYNC_DB)
  #[arg(short, long, global = true)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List workouts and their duplicate state
  Show {
    /// Only workouts waiting for a manual check
    #[arg(long)]
    manual_check: bool,
  },
  /// Import workouts from an external source
  Import {
    #[arg(value_enum)]
    source: ImportSource,
    /// Source file for csv and json
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Store only; run `check` afterwards to merge duplicates
    #[arg(long)]
    no_reconcile: bool,
  },
  /// Check every unreconciled workout for duplicates
  Check,
  /// Export all workouts
  Export {
    #[arg(value_enum)]
    format: ExportFormat,
    #[arg(short, long)]
    file: PathBuf,
  },
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => "off",
    1 => "error",
    2 => "warn",
    3 => "info",
    4 => "debug",
    _ => "trace",
  };

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
    )
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();
  init_logging(args.verbose);

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create tokio runtime")?;

  runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
  let config = SyncConfig::from_env(args.database).context("Failed to load configuration")?;
  let pool = db::initialize_db(&config.database)
    .await
    .with_context(|| format!("Failed to open database {}", config.database.display()))?;
  let store = WorkoutStore::new(pool, config.policy.clone());

  match args.command {
    Command::Show { manual_check } => {
      for line in commands::show_workouts(&store, manual_check).await? {
        println!("{}", line);
      }
      if !manual_check {
        for state in commands::get_sync_state(&store).await? {
          println!(
            "last {} sync: {}",
            state.source,
            state
              .last_sync_at
              .map(|t| t.to_rfc3339())
              .unwrap_or_else(|| "never".to_string())
          );
        }
      }
    }
    Command::Import {
      source,
      file,
      no_reconcile,
    } => {
      let report =
        commands::import::run_import(&store, &config, source, file.as_deref(), !no_reconcile)
          .await?;
      println!(
        "{} workouts fetched and {} workouts imported ({} already present, {} failed)",
        report.fetched, report.imported, report.already_present, report.failed
      );
      if !no_reconcile {
        println!(
          "{} duplicates superseded, {} merged workouts created, {} need a manual check",
          report.superseded, report.merged_created, report.manual_checks
        );
      }
    }
    Command::Check => {
      let report = commands::run_check(&store).await?;
      println!(
        "{} workouts checked: {} duplicates superseded, {} merged workouts created, {} need a manual check, {} failed",
        report.examined, report.superseded, report.merged_created, report.manual_checks, report.failed
      );
    }
    Command::Export { format, file } => {
      let exported = commands::export::run_export(&store, format, &file).await?;
      println!("{} workouts exported to {}", exported, file.display());
    }
  }

  store.pool().close().await;
  Ok(())
}
