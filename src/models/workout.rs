use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::query::Query;

use crate::error::AttributeError;

/// Source name carried by synthetic merged workouts.
pub const MERGED_SOURCE: &str = "MERGED";

/// Timestamp layout used in CSV/JSON files and log output.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ---------------------------------------------------------------------------
/// Attribute values
/// ---------------------------------------------------------------------------

/// A scalar that can live in a workout attribute column.
pub trait AttributeValue: Sized + Clone {
  fn parse_attr(raw: &str) -> Result<Self, String>;
  fn render_attr(&self) -> String;
  fn json_attr(&self) -> Value;
}

impl AttributeValue for String {
  fn parse_attr(raw: &str) -> Result<Self, String> {
    Ok(raw.to_string())
  }

  fn render_attr(&self) -> String {
    self.clone()
  }

  fn json_attr(&self) -> Value {
    Value::String(self.clone())
  }
}

impl AttributeValue for i64 {
  fn parse_attr(raw: &str) -> Result<Self, String> {
    // Exports from some tools write integral counters as "600.0"
    if let Ok(value) = raw.parse::<i64>() {
      return Ok(value);
    }
    let value = raw.parse::<f64>().map_err(|e| e.to_string())?.round();
    // i64::MAX as f64 rounds up to 2^63, hence the strict bound
    if !value.is_finite() || value < i64::MIN as f64 || value >= i64::MAX as f64 {
      return Err(format!("{raw:?} is out of range for an integer column"));
    }
    Ok(value as i64)
  }

  fn render_attr(&self) -> String {
    self.to_string()
  }

  fn json_attr(&self) -> Value {
    Value::from(*self)
  }
}

impl AttributeValue for f64 {
  fn parse_attr(raw: &str) -> Result<Self, String> {
    raw.parse::<f64>().map_err(|e| e.to_string())
  }

  fn render_attr(&self) -> String {
    self.to_string()
  }

  fn json_attr(&self) -> Value {
    serde_json::Number::from_f64(*self)
      .map(Value::Number)
      .unwrap_or(Value::Null)
  }
}

impl AttributeValue for NaiveDateTime {
  fn parse_attr(raw: &str) -> Result<Self, String> {
    const FORMATS: [&str; 4] = [
      DATETIME_FORMAT,
      "%Y-%m-%dT%H:%M:%S",
      "%Y-%m-%d %H:%M:%S%.f",
      "%Y-%m-%dT%H:%M:%S%.f",
    ];
    FORMATS
      .iter()
      .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
      .ok_or_else(|| format!("expected a timestamp like 2020-05-21 20:00:00, got {raw:?}"))
  }

  fn render_attr(&self) -> String {
    self.format(DATETIME_FORMAT).to_string()
  }

  fn json_attr(&self) -> Value {
    Value::String(self.render_attr())
  }
}

fn parse_attribute<T: AttributeValue>(column: &str, raw: &str) -> Result<Option<T>, AttributeError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }
  T::parse_attr(trimmed).map(Some).map_err(|reason| AttributeError {
    column: column.to_string(),
    value: raw.to_string(),
    reason,
  })
}

fn render_attribute<T: AttributeValue>(value: &Option<T>) -> String {
  value.as_ref().map(AttributeValue::render_attr).unwrap_or_default()
}

fn json_attribute<T: AttributeValue>(value: &Option<T>) -> Value {
  value.as_ref().map(AttributeValue::json_attr).unwrap_or(Value::Null)
}

/// ---------------------------------------------------------------------------
/// Workout attributes
/// ---------------------------------------------------------------------------

/// Declares the mergeable attribute columns once. Storage, merging and
/// flattening all walk this list, so a column cannot be missed by one of them.
macro_rules! workout_attributes {
  ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
    /// Descriptive, temporal and performance attributes of a workout.
    ///
    /// Identity (`source`, `external_id`), classification and reconciliation
    /// bookkeeping live on [`Workout`]; everything here is optional and
    /// participates in the fill-only merge.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
    pub struct WorkoutAttributes {
      $( $(#[$meta])* pub $field: Option<$ty>, )*
    }

    impl WorkoutAttributes {
      /// Column names in storage and export order.
      pub const COLUMNS: &'static [&'static str] = &[$( stringify!($field) ),*];

      /// Copy every attribute that is empty here but set on `other`.
      /// Populated attributes are never overwritten. Returns how many were filled.
      pub fn fill_missing_from(&mut self, other: &Self) -> usize {
        let mut filled = 0;
        $(
          if self.$field.is_none() && other.$field.is_some() {
            self.$field = other.$field.clone();
            filled += 1;
          }
        )*
        filled
      }

      /// Set a column from its textual form. Returns `Ok(false)` for unknown columns.
      pub fn set_column(&mut self, column: &str, raw: &str) -> Result<bool, AttributeError> {
        match column {
          $( stringify!($field) => {
            self.$field = parse_attribute::<$ty>(column, raw)?;
            Ok(true)
          } )*
          _ => Ok(false),
        }
      }

      /// Textual values in [`Self::COLUMNS`] order; empty string for null.
      pub fn rendered(&self) -> Vec<String> {
        vec![$( render_attribute(&self.$field) ),*]
      }

      /// Insert every attribute into a JSON object, nulls included.
      pub fn extend_json(&self, map: &mut serde_json::Map<String, Value>) {
        $( map.insert(stringify!($field).to_string(), json_attribute(&self.$field)); )*
      }

      /// Bind every attribute, in [`Self::COLUMNS`] order.
      pub(crate) fn bind_all<'q>(
        &self,
        mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
      ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        $( query = query.bind(self.$field.clone()); )*
        query
      }
    }
  };
}

workout_attributes! {
  name: String,
  description: String,
  /// Celsius
  min_temperature: f64,
  max_temperature: f64,

  /// Local wall-clock start time
  start_time: NaiveDateTime,
  /// Total elapsed time
  duration_sec: i64,
  moving_duration_sec: i64,

  distance_m: f64,
  average_speed_kmh: f64,
  max_speed_kmh: f64,
  elevation_gain_m: f64,
  elevation_loss_m: f64,
  calories: i64,

  average_hr: i64,
  max_hr: i64,

  avg_power: f64,
  max_power: f64,
  norm_power: f64,
  /// Best average power over rolling windows, window length in seconds
  max_avg_power_1: f64,
  max_avg_power_2: f64,
  max_avg_power_5: f64,
  max_avg_power_10: f64,
  max_avg_power_20: f64,
  max_avg_power_30: f64,
  max_avg_power_60: f64,
  max_avg_power_120: f64,
  max_avg_power_300: f64,
  max_avg_power_600: f64,
  max_avg_power_1200: f64,
  max_avg_power_1800: f64,
  max_avg_power_3600: f64,
  max_avg_power_7200: f64,
  max_avg_power_18000: f64,
  left_balance: f64,
  right_balance: f64,

  /// Steps per minute
  avg_running_cadence: f64,
  max_running_cadence: f64,
  /// Revolutions per minute
  avg_biking_cadence: f64,
  max_biking_cadence: f64,
  /// Strokes per minute
  avg_swim_cadence: f64,
  max_swim_cadence: f64,

  avg_swolf: f64,
  active_lengths: i64,
  pool_length: f64,
  strokes: i64,
  avg_stroke_distance: f64,

  /// Milliseconds
  avg_ground_contact_time: f64,
  avg_ground_contact_balance: f64,
  /// Centimeters
  avg_vertical_oscillation: f64,
  avg_vertical_ratio: f64,
  avg_stride_length: f64,

  aerobic_training_effect: f64,
  anaerobic_training_effect: f64,
  training_stress_score: f64,
  intensity_factor: f64,
  vo2_max: f64,
  lactate_threshold_bpm: i64,
  lactate_threshold_speed: f64,
  ftp: f64,
}

impl WorkoutAttributes {
  /// Interval covered by the workout, if both start time and duration are known.
  pub fn time_range(&self) -> Option<TimeRange> {
    TimeRange::from_start(self.start_time?, self.duration_sec?)
  }
}

/// ---------------------------------------------------------------------------
/// Time ranges
/// ---------------------------------------------------------------------------

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
  pub start: NaiveDateTime,
  pub end: NaiveDateTime,
}

impl TimeRange {
  /// `None` for negative durations and for ends past the representable range.
  pub fn from_start(start: NaiveDateTime, duration_sec: i64) -> Option<Self> {
    if duration_sec < 0 {
      return None;
    }
    let end = start.checked_add_signed(Duration::try_seconds(duration_sec)?)?;
    Some(Self { start, end })
  }

  pub fn intersects(&self, other: &TimeRange) -> bool {
    self.start < other.end && other.start < self.end
  }
}

/// ---------------------------------------------------------------------------
/// Workouts
/// ---------------------------------------------------------------------------

/// Where a workout stands in duplicate reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "with", rename_all = "snake_case")]
pub enum ReconcileState {
  Unreconciled,
  /// Synthetic merged record; may absorb further duplicates.
  Canonical,
  Superseded(i64),
  NeedsManualCheck(i64),
}

impl std::fmt::Display for ReconcileState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Unreconciled => write!(f, "unreconciled"),
      Self::Canonical => write!(f, "canonical"),
      Self::Superseded(id) => write!(f, "superseded by {}", id),
      Self::NeedsManualCheck(id) => write!(f, "manual check with {}", id),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workout {
  pub id: i64,
  pub source: String,
  pub external_id: String,
  pub sportstype_id: Option<i64>,
  /// Denormalized from the sportstype
  pub sport_id: Option<i64>,
  #[sqlx(flatten)]
  #[serde(flatten)]
  pub attributes: WorkoutAttributes,
  pub is_duplicate_with: Option<i64>,
  pub manual_check_required_with: Option<i64>,
}

impl Workout {
  pub fn state(&self) -> ReconcileState {
    match (self.is_duplicate_with, self.manual_check_required_with) {
      (Some(id), _) => ReconcileState::Superseded(id),
      (None, Some(id)) => ReconcileState::NeedsManualCheck(id),
      (None, None) if self.is_merged() => ReconcileState::Canonical,
      (None, None) => ReconcileState::Unreconciled,
    }
  }

  pub fn is_merged(&self) -> bool {
    self.source == MERGED_SOURCE
  }

  /// Superseded and manual-check records are terminal.
  pub fn is_settled(&self) -> bool {
    self.is_duplicate_with.is_some() || self.manual_check_required_with.is_some()
  }

  pub fn time_range(&self) -> Option<TimeRange> {
    self.attributes.time_range()
  }

  /// Fill-only merge of classification and attributes from a contributor.
  pub fn absorb(&mut self, contributor: &Workout) -> usize {
    let mut filled = self.attributes.fill_missing_from(&contributor.attributes);
    if self.sportstype_id.is_none() && contributor.sportstype_id.is_some() {
      self.sportstype_id = contributor.sportstype_id;
      filled += 1;
    }
    if self.sport_id.is_none() && contributor.sport_id.is_some() {
      self.sport_id = contributor.sport_id;
      filled += 1;
    }
    filled
  }
}

/// For inserting new workouts (without id and bookkeeping)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkout {
  pub source: String,
  pub external_id: String,
  pub sportstype_id: Option<i64>,
  pub sport_id: Option<i64>,
  pub attributes: WorkoutAttributes,
}
