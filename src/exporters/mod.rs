//! Exporters
//!
//! Workouts leave the store flattened: identity, sportstype name and the
//! attribute columns. Reconciliation bookkeeping, the surrogate id and the
//! sport/sportstype foreign keys stay internal. The `id` column carries the
//! external id, so an export can be imported again.

pub mod csv;
pub mod json;

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{Workout, WorkoutAttributes};
use crate::store::WorkoutStore;
use crate::taxonomy;

const IDENTITY_COLUMNS: [&str; 3] = ["id", "source", "sportstype"];

/// Column names of a flattened workout, in order.
pub fn header() -> Vec<&'static str> {
  IDENTITY_COLUMNS
    .iter()
    .chain(WorkoutAttributes::COLUMNS.iter())
    .copied()
    .collect()
}

/// Flattens workouts, resolving sportstype ids to names.
pub struct Flattener {
  sportstype_names: HashMap<i64, String>,
}

impl Flattener {
  pub async fn load(store: &WorkoutStore) -> Result<Self, StoreError> {
    Ok(Self {
      sportstype_names: taxonomy::sportstype_names(store.pool()).await?,
    })
  }

  fn sportstype(&self, workout: &Workout) -> Option<&str> {
    workout
      .sportstype_id
      .and_then(|id| self.sportstype_names.get(&id))
      .map(String::as_str)
  }

  /// Key-value form, nulls included.
  pub fn as_map(&self, workout: &Workout) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::String(workout.external_id.clone()));
    map.insert("source".to_string(), Value::String(workout.source.clone()));
    map.insert(
      "sportstype".to_string(),
      self
        .sportstype(workout)
        .map(|name| Value::String(name.to_string()))
        .unwrap_or(Value::Null),
    );
    workout.attributes.extend_json(&mut map);
    map
  }

  /// Ordered form matching [`header`]; empty string for null.
  pub fn as_list(&self, workout: &Workout) -> Vec<String> {
    let mut row = vec![
      workout.external_id.clone(),
      workout.source.clone(),
      self.sportstype(workout).unwrap_or_default().to_string(),
    ];
    row.extend(workout.attributes.rendered());
    row
  }
}
