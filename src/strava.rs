//! Strava importer
//!
//! Fetches the athlete's activity list page by page and maps each activity
//! onto a [`WorkoutRecord`]. Syncs are incremental: the start of the newest
//! activity seen is kept in `sync_state` and only later activities are
//! requested next time. Token acquisition is not handled here; an access
//! token is supplied through configuration.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ImportError;
use crate::importers::{import_records, ImportReport, WorkoutRecord};
use crate::models::WorkoutAttributes;
use crate::store::WorkoutStore;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

pub const STRAVA_SOURCE: &str = "Strava";
pub const DEFAULT_API_BASE: &str = "https://www.strava.com/api/v3";
const PAGE_SIZE: u32 = 50;
const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone)]
pub struct StravaConfig {
  pub access_token: String,
  pub api_base: String,
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Invalid API base URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("Strava API returned {status}: {message}")]
  Api { status: u16, message: String },

  #[error("Failed to parse activities: {0}")]
  Parse(String),

  #[error("Not authenticated with Strava")]
  NotAuthenticated,
}

/// ---------------------------------------------------------------------------
/// Strava API - Activity Fetching
/// ---------------------------------------------------------------------------

/// Activity summary from Strava API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaActivity {
  pub id: i64,
  pub name: String,
  /// Strava uses "type" for legacy and "sport_type" for newer activities
  #[serde(rename = "type", default)]
  pub activity_type: String,
  #[serde(default)]
  pub sport_type: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  pub start_date: DateTime<Utc>,
  /// Local wall-clock time, sent with a misleading `Z` suffix
  pub start_date_local: DateTime<Utc>,
  #[serde(default)]
  pub elapsed_time: i64,
  #[serde(default)]
  pub moving_time: i64,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub total_elevation_gain: Option<f64>,
  /// m/s
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub max_speed: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<f64>,
  #[serde(default)]
  pub max_heartrate: Option<f64>,
  #[serde(default)]
  pub average_watts: Option<f64>,
  #[serde(default)]
  pub max_watts: Option<f64>,
  #[serde(default)]
  pub weighted_average_watts: Option<f64>,
  /// rpm on rides, strides (one foot) per minute on runs
  #[serde(default)]
  pub average_cadence: Option<f64>,
  #[serde(default)]
  pub calories: Option<f64>,
}

impl StravaActivity {
  pub fn label(&self) -> &str {
    self.sport_type.as_deref().unwrap_or(&self.activity_type)
  }

  fn is_run(&self) -> bool {
    matches!(self.label(), "Run" | "TrailRun" | "VirtualRun")
  }

  fn is_ride(&self) -> bool {
    self.label().contains("Ride")
  }

  pub fn to_record(&self) -> WorkoutRecord {
    let cadence = self.average_cadence;
    let attributes = WorkoutAttributes {
      name: Some(self.name.clone()),
      description: self.description.clone().filter(|d| !d.is_empty()),
      start_time: Some(self.start_date_local.naive_utc()),
      duration_sec: Some(self.elapsed_time),
      moving_duration_sec: Some(self.moving_time),
      distance_m: self.distance,
      average_speed_kmh: self.average_speed.map(|v| v * MPS_TO_KMH),
      max_speed_kmh: self.max_speed.map(|v| v * MPS_TO_KMH),
      elevation_gain_m: self.total_elevation_gain,
      calories: self.calories.map(|c| c.round() as i64),
      average_hr: self.average_heartrate.map(|hr| hr.round() as i64),
      max_hr: self.max_heartrate.map(|hr| hr.round() as i64),
      avg_power: self.average_watts,
      max_power: self.max_watts,
      norm_power: self.weighted_average_watts,
      avg_running_cadence: cadence.filter(|_| self.is_run()).map(|c| c * 2.0),
      avg_biking_cadence: cadence.filter(|_| self.is_ride()),
      ..Default::default()
    };

    WorkoutRecord {
      source: Some(STRAVA_SOURCE.to_string()),
      external_id: self.id.to_string(),
      sportstype: Some(self.label().to_string()),
      attributes,
    }
  }
}

fn activities_url(
  config: &StravaConfig,
  after: Option<i64>,
  page: u32,
  per_page: u32,
) -> Result<Url, StravaError> {
  let mut url = Url::parse(&format!(
    "{}/athlete/activities",
    config.api_base.trim_end_matches('/')
  ))?;

  {
    let mut query = url.query_pairs_mut();
    query
      .append_pair("per_page", &per_page.to_string())
      .append_pair("page", &page.to_string());
    if let Some(after_timestamp) = after {
      query.append_pair("after", &after_timestamp.to_string());
    }
  }

  Ok(url)
}

/// Fetch one page of activities starting after `after` (epoch seconds).
pub async fn fetch_activities(
  client: &Client,
  config: &StravaConfig,
  after: Option<i64>,
  page: u32,
  per_page: u32,
) -> Result<Vec<StravaActivity>, StravaError> {
  let url = activities_url(config, after, page, per_page)?;

  let response = client
    .get(url)
    .header("Authorization", format!("Bearer {}", config.access_token))
    .send()
    .await?;

  if response.status() == reqwest::StatusCode::UNAUTHORIZED {
    return Err(StravaError::NotAuthenticated);
  }

  if !response.status().is_success() {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    return Err(StravaError::Api { status, message });
  }

  let response_text = response.text().await?;

  serde_json::from_str(&response_text).map_err(|e| {
    tracing::debug!(
      body = %response_text.chars().take(1000).collect::<String>(),
      "Unparseable Strava response"
    );
    StravaError::Parse(e.to_string())
  })
}

/// Fetch every activity after `after`, following pages until a short one.
#[tracing::instrument(skip(config))]
pub async fn fetch_all_activities(
  config: &StravaConfig,
  after: Option<i64>,
) -> Result<Vec<StravaActivity>, StravaError> {
  let client = Client::new();
  let mut activities = Vec::new();
  let mut page = 1;

  loop {
    let batch = fetch_activities(&client, config, after, page, PAGE_SIZE).await?;
    let fetched = batch.len();
    tracing::debug!(page, fetched, "Fetched Strava activity page");
    activities.extend(batch);

    if fetched < PAGE_SIZE as usize {
      break;
    }
    page += 1;
  }

  Ok(activities)
}

/// ---------------------------------------------------------------------------
/// Sync Activities from Strava
/// ---------------------------------------------------------------------------

/// Import every activity newer than the last sync and remember the newest one.
pub async fn import_strava(
  store: &WorkoutStore,
  config: &StravaConfig,
  reconcile: bool,
) -> Result<ImportReport, ImportError> {
  let after = store
    .sync_state(STRAVA_SOURCE)
    .await?
    .and_then(|state| state.last_activity_at)
    .map(|last| last.and_utc().timestamp());

  tracing::info!(after, "Fetching Strava activities");
  let activities = fetch_all_activities(config, after).await?;

  let newest: Option<NaiveDateTime> = activities.iter().map(|a| a.start_date.naive_utc()).max();
  let report = import_records(
    store,
    activities.iter().map(|activity| Ok(activity.to_record())),
    STRAVA_SOURCE,
    reconcile,
  )
  .await;

  store.record_sync(STRAVA_SOURCE, newest).await?;
  Ok(report)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
