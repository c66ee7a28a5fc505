//! Configuration loaded from environment variables (and `.env`).

use std::env;
use std::path::PathBuf;

use crate::reconcile::MergePolicy;
use crate::strava::{StravaConfig, DEFAULT_API_BASE};

#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// SQLite workouts database
  pub database: PathBuf,
  pub policy: MergePolicy,
  pub strava_access_token: Option<String>,
  pub strava_api_base: String,
}

impl SyncConfig {
  /// Load configuration; `database` from the command line wins over
  /// `WORKOUT_SYNC_DB`.
  pub fn from_env(database: Option<PathBuf>) -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok(); // Load .env file if present

    let database = match database {
      Some(path) => path,
      None => env::var("WORKOUT_SYNC_DB")
        .map(PathBuf::from)
        .map_err(|_| ConfigError::Missing("WORKOUT_SYNC_DB"))?,
    };

    let defaults = MergePolicy::default();
    let policy = MergePolicy {
      trainer_app_marker: env::var("WORKOUT_SYNC_TRAINER_MARKER")
        .unwrap_or(defaults.trainer_app_marker),
      trusted_source: env::var("WORKOUT_SYNC_TRUSTED_SOURCE").unwrap_or(defaults.trusted_source),
    };
    if policy.trusted_source.trim().is_empty() {
      return Err(ConfigError::Invalid {
        name: "WORKOUT_SYNC_TRUSTED_SOURCE",
        reason: "must not be empty",
      });
    }

    Ok(Self {
      database,
      policy,
      strava_access_token: env::var("STRAVA_ACCESS_TOKEN")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()),
      strava_api_base: env::var("STRAVA_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
    })
  }

  /// Strava client settings; only needed when importing from Strava.
  pub fn strava(&self) -> Result<StravaConfig, ConfigError> {
    let access_token = self
      .strava_access_token
      .clone()
      .ok_or(ConfigError::Missing("STRAVA_ACCESS_TOKEN"))?;
    Ok(StravaConfig {
      access_token,
      api_base: self.strava_api_base.clone(),
    })
  }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Missing required environment variable: {0}")]
  Missing(&'static str),

  #[error("Invalid value for {name}: {reason}")]
  Invalid {
    name: &'static str,
    reason: &'static str,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const VARS: [&str; 5] = [
    "WORKOUT_SYNC_DB",
    "WORKOUT_SYNC_TRAINER_MARKER",
    "WORKOUT_SYNC_TRUSTED_SOURCE",
    "STRAVA_ACCESS_TOKEN",
    "STRAVA_API_BASE",
  ];

  fn with_env<F: FnOnce()>(set: &[(&str, &str)], f: F) {
    let vars: Vec<(&str, Option<&str>)> = VARS
      .iter()
      .map(|name| {
        let value = set.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
        (*name, value)
      })
      .collect();
    temp_env::with_vars(vars, f);
  }

  #[test]
  #[serial]
  fn test_defaults() {
    with_env(&[("WORKOUT_SYNC_DB", "/tmp/workouts.db")], || {
      let config = SyncConfig::from_env(None).unwrap();
      assert_eq!(config.database, PathBuf::from("/tmp/workouts.db"));
      assert_eq!(config.policy, MergePolicy::default());
      assert_eq!(config.strava_api_base, DEFAULT_API_BASE);
      assert!(matches!(config.strava(), Err(ConfigError::Missing("STRAVA_ACCESS_TOKEN"))));
    });
  }

  #[test]
  #[serial]
  fn test_command_line_database_wins() {
    with_env(&[("WORKOUT_SYNC_DB", "/tmp/env.db")], || {
      let config = SyncConfig::from_env(Some(PathBuf::from("cli.db"))).unwrap();
      assert_eq!(config.database, PathBuf::from("cli.db"));
    });
  }

  #[test]
  #[serial]
  fn test_missing_database() {
    with_env(&[], || {
      assert!(matches!(
        SyncConfig::from_env(None),
        Err(ConfigError::Missing("WORKOUT_SYNC_DB"))
      ));
    });
  }

  #[test]
  #[serial]
  fn test_overrides() {
    with_env(
      &[
        ("WORKOUT_SYNC_DB", "w.db"),
        ("WORKOUT_SYNC_TRAINER_MARKER", "TrainerRoad"),
        ("WORKOUT_SYNC_TRUSTED_SOURCE", "garmin"),
        ("STRAVA_ACCESS_TOKEN", " abc "),
        ("STRAVA_API_BASE", "http://localhost:1234"),
      ],
      || {
        let config = SyncConfig::from_env(None).unwrap();
        assert_eq!(config.policy.trainer_app_marker, "TrainerRoad");
        assert_eq!(config.policy.trusted_source, "garmin");
        let strava = config.strava().unwrap();
        assert_eq!(strava.access_token, "abc");
        assert_eq!(strava.api_base, "http://localhost:1234");
      },
    );
  }

  #[test]
  #[serial]
  fn test_empty_trusted_source_is_rejected() {
    with_env(&[("WORKOUT_SYNC_DB", "w.db"), ("WORKOUT_SYNC_TRUSTED_SOURCE", " ")], || {
      assert!(matches!(SyncConfig::from_env(None), Err(ConfigError::Invalid { .. })));
    });
  }
}
