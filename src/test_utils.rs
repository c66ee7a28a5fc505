//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Store and workout factories
//! - Mock Strava activities

use crate::importers::WorkoutRecord;
use crate::models::{NewWorkout, Workout, WorkoutAttributes, DATETIME_FORMAT};
use crate::reconcile::MergePolicy;
use crate::store::WorkoutStore;
use crate::strava::StravaActivity;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  crate::db::initialize_in_memory()
    .await
    .expect("Failed to create in-memory database")
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Seed sports and sportstypes: id 1 is Cycling, id 2 is Running
pub async fn seed_test_sports(pool: &SqlitePool) {
  for (id, name) in [(1_i64, "Cycling"), (2, "Running")] {
    sqlx::query("INSERT INTO sports (id, name) VALUES (?1, ?2)")
      .bind(id)
      .bind(name)
      .execute(pool)
      .await
      .expect("Failed to seed sport");
    sqlx::query("INSERT INTO sportstypes (id, name, sport_id) VALUES (?1, ?2, ?1)")
      .bind(id)
      .bind(name)
      .execute(pool)
      .await
      .expect("Failed to seed sportstype");
  }
}

/// Store over a seeded in-memory database with the default merge policy
pub async fn setup_test_store() -> WorkoutStore {
  let pool = setup_test_db().await;
  seed_test_sports(&pool).await;
  WorkoutStore::new(pool, MergePolicy::default())
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// Parse a `%Y-%m-%d %H:%M:%S` timestamp
pub fn at(s: &str) -> NaiveDateTime {
  NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).expect("Invalid test timestamp")
}

/// New workout whose sportstype id equals its sport id (see [`seed_test_sports`])
pub fn new_workout(
  source: &str,
  external_id: &str,
  sport_id: i64,
  start: &str,
  duration_sec: i64,
) -> NewWorkout {
  NewWorkout {
    source: source.to_string(),
    external_id: external_id.to_string(),
    sportstype_id: Some(sport_id),
    sport_id: Some(sport_id),
    attributes: WorkoutAttributes {
      start_time: Some(at(start)),
      duration_sec: Some(duration_sec),
      ..Default::default()
    },
  }
}

/// An unreconciled workout as it would come back from the store
pub fn stored_workout(id: i64, source: &str, sport_id: i64) -> Workout {
  Workout {
    id,
    source: source.to_string(),
    external_id: id.to_string(),
    sportstype_id: Some(sport_id),
    sport_id: Some(sport_id),
    attributes: WorkoutAttributes::default(),
    is_duplicate_with: None,
    manual_check_required_with: None,
  }
}

/// Importer record with a label, start time and duration
pub fn mock_record(external_id: &str, sportstype: &str, start: &str, duration_sec: i64) -> WorkoutRecord {
  WorkoutRecord {
    source: None,
    external_id: external_id.to_string(),
    sportstype: Some(sportstype.to_string()),
    attributes: WorkoutAttributes {
      start_time: Some(at(start)),
      duration_sec: Some(duration_sec),
      ..Default::default()
    },
  }
}

/// Create a mock Strava activity for testing
pub fn mock_strava_activity() -> StravaActivity {
  StravaActivity {
    id: 123456,
    name: "Morning Run".to_string(),
    activity_type: "Run".to_string(),
    sport_type: Some("Run".to_string()),
    description: None,
    start_date: at("2020-05-21 05:30:00").and_utc(),
    start_date_local: at("2020-05-21 07:30:00").and_utc(),
    elapsed_time: 3600,
    moving_time: 3500,
    distance: Some(10000.0),
    total_elevation_gain: Some(100.0),
    average_speed: Some(2.5),
    max_speed: Some(4.0),
    average_heartrate: Some(145.0),
    max_heartrate: Some(165.0),
    average_watts: None,
    max_watts: None,
    weighted_average_watts: None,
    average_cadence: Some(85.0),
    calories: None,
  }
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_store_seeds_sports() {
    let store = setup_test_store().await;

    let names = crate::taxonomy::sportstype_names(store.pool()).await.unwrap();
    assert_eq!(names.get(&1).map(String::as_str), Some("Cycling"));
    assert_eq!(names.get(&2).map(String::as_str), Some("Running"));
    assert_eq!(store.count().await.unwrap(), 0);
  }

  #[test]
  fn test_new_workout_has_time_range() {
    let workout = new_workout("csv", "1", 1, "2020-05-21 20:00:00", 600);
    let range = workout.attributes.time_range().unwrap();
    assert_eq!(range.end, at("2020-05-21 20:10:00"));
  }
}
