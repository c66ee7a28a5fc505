//! Sport / SportsType taxonomy
//!
//! Maps arbitrary vendor activity labels ("MountainBikeRide", "indoor_cycling",
//! "RuNnInG") onto a small canonical set of (sportstype, sport) pairs and makes
//! sure both exist in the store.
//!
//! Labels are matched case-insensitively against a static synonym table.
//! Unknown labels pass through as their own sportstype and sport. The vendor
//! bucket "other" is handled separately: the workout's display name is
//! searched for a known activity, so "Morning Yoga" filed under "other"
//! still lands on Yoga. Importers send records without any label down the
//! same path as an empty label.

use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{Sport, SportsType};

/// Vendor label for the catch-all bucket.
const OTHER_LABEL: &str = "other";
/// Canonical name used when "other" cannot be resolved from the workout name.
const OTHER_CANONICAL: &str = "Other";

/// ---------------------------------------------------------------------------
/// Synonym table
/// ---------------------------------------------------------------------------

struct TaxonomyEntry {
  sportstype: &'static str,
  sport: &'static str,
  synonyms: &'static [&'static str],
}

const TAXONOMY: &[TaxonomyEntry] = &[
  TaxonomyEntry {
    sportstype: "Cycling",
    sport: "Cycling",
    synonyms: &["biking", "bike", "ride", "cycling", "ebikeride", "e bike ride"],
  },
  TaxonomyEntry {
    sportstype: "Road Cycling",
    sport: "Cycling",
    synonyms: &["road biking", "road bike", "race bike", "rennrad"],
  },
  TaxonomyEntry {
    sportstype: "Indoor Cycling",
    sport: "Cycling",
    synonyms: &["virtualride", "virtual ride", "indoor bike", "spinning", "indoor rad"],
  },
  TaxonomyEntry {
    sportstype: "Mountain Biking",
    sport: "Cycling",
    synonyms: &["mtb", "mountainbikeride", "mountain bike ride", "mountain bike"],
  },
  TaxonomyEntry {
    sportstype: "Gravel Cycling",
    sport: "Cycling",
    synonyms: &["gravelride", "gravel ride", "trekking bike", "gravel bike"],
  },
  TaxonomyEntry {
    sportstype: "Running",
    sport: "Running",
    synonyms: &["run", "street running", "laufen", "road running"],
  },
  TaxonomyEntry {
    sportstype: "Trail Running",
    sport: "Running",
    synonyms: &["trailrun", "trail run", "cross running", "crosslauf"],
  },
  TaxonomyEntry {
    sportstype: "Treadmill Running",
    sport: "Running",
    synonyms: &["treadmill", "virtualrun", "virtual run", "indoor running"],
  },
  TaxonomyEntry {
    sportstype: "Pool Swimming",
    sport: "Swimming",
    synonyms: &["lap swimming", "swim", "swimming", "pool swim"],
  },
  TaxonomyEntry {
    sportstype: "Open Water Swimming",
    sport: "Swimming",
    synonyms: &["open water swim", "openwaterswim"],
  },
  TaxonomyEntry {
    sportstype: "Walking",
    sport: "Walking",
    synonyms: &["walk", "casual walking", "speed walking"],
  },
  TaxonomyEntry {
    sportstype: "Hiking",
    sport: "Walking",
    synonyms: &["hike", "wandern"],
  },
  TaxonomyEntry {
    sportstype: "Strength Training",
    sport: "Fitness",
    synonyms: &["weighttraining", "weight training", "strength", "krafttraining"],
  },
  TaxonomyEntry {
    sportstype: "Yoga",
    sport: "Fitness",
    synonyms: &[],
  },
  TaxonomyEntry {
    sportstype: "Indoor Cardio",
    sport: "Fitness",
    synonyms: &["cardio", "hiit", "crossfit", "elliptical"],
  },
  TaxonomyEntry {
    sportstype: "Cross-Country Skiing",
    sport: "Skiing",
    synonyms: &["nordicski", "cross country skiing", "backcountryski", "langlauf"],
  },
  TaxonomyEntry {
    sportstype: "Alpine Skiing",
    sport: "Skiing",
    synonyms: &["alpineski", "resort skiing", "downhill skiing"],
  },
];

/// Lowercased label (or synonym) -> index into TAXONOMY
static SYNONYMS: Lazy<HashMap<String, usize>> = Lazy::new(|| {
  let mut map = HashMap::new();
  for (idx, entry) in TAXONOMY.iter().enumerate() {
    map.insert(normalize_key(entry.sportstype), idx);
    for synonym in entry.synonyms {
      map.insert(normalize_key(synonym), idx);
    }
  }
  map
});

/// Lowercase, treat `_` and `-` as spaces, collapse whitespace.
fn normalize_key(label: &str) -> String {
  words(label).join(" ")
}

fn words(text: &str) -> Vec<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
    .collect()
}

/// ---------------------------------------------------------------------------
/// Normalization
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSport {
  pub sportstype: String,
  pub sport: String,
}

impl CanonicalSport {
  fn from_entry(entry: &TaxonomyEntry) -> Self {
    Self {
      sportstype: entry.sportstype.to_string(),
      sport: entry.sport.to_string(),
    }
  }

  fn passthrough(name: &str) -> Self {
    Self {
      sportstype: name.to_string(),
      sport: name.to_string(),
    }
  }
}

/// Resolve a vendor label to its canonical (sportstype, sport) names.
///
/// `workout_name` is only consulted for the "other" bucket (or a missing label).
pub fn normalize(label: &str, workout_name: Option<&str>) -> CanonicalSport {
  let key = normalize_key(label);

  if key.is_empty() || key == OTHER_LABEL {
    return workout_name
      .and_then(classify_by_name)
      .map(CanonicalSport::from_entry)
      .unwrap_or_else(|| CanonicalSport::passthrough(OTHER_CANONICAL));
  }

  match SYNONYMS.get(&key) {
    Some(&idx) => CanonicalSport::from_entry(&TAXONOMY[idx]),
    None => CanonicalSport::passthrough(label.trim()),
  }
}

/// Find the known activity mentioned in a free-text workout name.
/// The longest matching phrase wins, so "Trail Running" beats "Running".
fn classify_by_name(name: &str) -> Option<&'static TaxonomyEntry> {
  let name_words = words(name);
  let mut best: Option<(usize, &'static TaxonomyEntry)> = None;

  for entry in TAXONOMY {
    let phrases = std::iter::once(&entry.sportstype).chain(entry.synonyms.iter());
    for phrase in phrases {
      let phrase_words = words(phrase);
      if phrase_words.is_empty() || !contains_phrase(&name_words, &phrase_words) {
        continue;
      }
      let len = phrase_words.len();
      if best.map_or(true, |(best_len, _)| len > best_len) {
        best = Some((len, entry));
      }
    }
  }

  best.map(|(_, entry)| entry)
}

fn contains_phrase(haystack: &[String], phrase: &[String]) -> bool {
  haystack.windows(phrase.len()).any(|window| window == phrase)
}

/// ---------------------------------------------------------------------------
/// Persistence
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResolvedSportsType {
  pub sportstype: SportsType,
  pub sport: Sport,
}

/// Normalize a vendor label and return the stored sportstype and sport,
/// creating either row on first sight. Resolving the same canonical name
/// twice returns the existing rows.
#[tracing::instrument(skip(pool), level = "debug")]
pub async fn resolve_sportstype(
  pool: &SqlitePool,
  label: &str,
  workout_name: Option<&str>,
) -> Result<ResolvedSportsType, StoreError> {
  let canonical = normalize(label, workout_name);

  if let Some(sportstype) = find_sportstype(pool, &canonical.sportstype).await? {
    let sport = find_sport_by_id(pool, sportstype.sport_id).await?;
    return Ok(ResolvedSportsType { sportstype, sport });
  }

  let sport = find_or_create_sport(pool, &canonical.sport).await?;

  let result = sqlx::query("INSERT INTO sportstypes (name, sport_id) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING")
    .bind(&canonical.sportstype)
    .bind(sport.id)
    .execute(pool)
    .await?;
  if result.rows_affected() > 0 {
    tracing::info!(
      sportstype = %canonical.sportstype,
      sport = %sport.name,
      sport_id = sport.id,
      "Adding new sportstype"
    );
  }

  let sportstype = find_sportstype(pool, &canonical.sportstype)
    .await?
    .ok_or(sqlx::Error::RowNotFound)?;
  Ok(ResolvedSportsType { sportstype, sport })
}

pub async fn find_or_create_sport(pool: &SqlitePool, name: &str) -> Result<Sport, StoreError> {
  let result = sqlx::query("INSERT INTO sports (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
    .bind(name)
    .execute(pool)
    .await?;
  if result.rows_affected() > 0 {
    tracing::info!(sport = %name, "Adding new sport");
  }

  let sport = sqlx::query_as::<_, Sport>("SELECT id, name FROM sports WHERE name = ?1")
    .bind(name)
    .fetch_one(pool)
    .await?;
  Ok(sport)
}

pub async fn find_sport(pool: &SqlitePool, name: &str) -> Result<Option<Sport>, StoreError> {
  let sport = sqlx::query_as::<_, Sport>("SELECT id, name FROM sports WHERE name = ?1")
    .bind(name)
    .fetch_optional(pool)
    .await?;
  Ok(sport)
}

async fn find_sport_by_id(pool: &SqlitePool, id: i64) -> Result<Sport, StoreError> {
  let sport = sqlx::query_as::<_, Sport>("SELECT id, name FROM sports WHERE id = ?1")
    .bind(id)
    .fetch_one(pool)
    .await?;
  Ok(sport)
}

pub async fn find_sportstype(pool: &SqlitePool, name: &str) -> Result<Option<SportsType>, StoreError> {
  let sportstype =
    sqlx::query_as::<_, SportsType>("SELECT id, name, sport_id FROM sportstypes WHERE name = ?1")
      .bind(name)
      .fetch_optional(pool)
      .await?;
  Ok(sportstype)
}

/// Sportstype id -> name, for flattening workouts on export.
pub async fn sportstype_names(pool: &SqlitePool) -> Result<HashMap<i64, String>, StoreError> {
  let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM sportstypes")
    .fetch_all(pool)
    .await?;
  Ok(rows.into_iter().collect())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::*;

  fn pair(sportstype: &str, sport: &str) -> CanonicalSport {
    CanonicalSport {
      sportstype: sportstype.to_string(),
      sport: sport.to_string(),
    }
  }

  #[test]
  fn test_synonyms_are_case_insensitive() {
    assert_eq!(normalize("RuNnInG", None), pair("Running", "Running"));
    assert_eq!(normalize("indoor_cycling", None), pair("Indoor Cycling", "Cycling"));
    assert_eq!(normalize("MountainBikeRide", None), pair("Mountain Biking", "Cycling"));
    assert_eq!(normalize("MTB", None), pair("Mountain Biking", "Cycling"));
    assert_eq!(normalize("Cross Running", None), pair("Trail Running", "Running"));
  }

  #[test]
  fn test_unknown_label_passes_through() {
    assert_eq!(normalize("New Type", None), pair("New Type", "New Type"));
    assert_eq!(normalize("  Kitesurfing ", None), pair("Kitesurfing", "Kitesurfing"));
  }

  #[test]
  fn test_other_uses_workout_name() {
    assert_eq!(normalize("other", Some("Morning Yoga")), pair("Yoga", "Fitness"));
    assert_eq!(normalize("OTHER", Some("Trail Running with Bob")), pair("Trail Running", "Running"));
    assert_eq!(normalize("other", Some("Brunch")), pair("Other", "Other"));
    assert_eq!(normalize("other", None), pair("Other", "Other"));
    assert_eq!(normalize("", Some("Morning Yoga")), pair("Yoga", "Fitness"));
  }

  #[test]
  fn test_name_is_ignored_for_known_labels() {
    assert_eq!(normalize("Run", Some("Yoga after run")), pair("Running", "Running"));
  }

  #[test]
  fn test_name_matching_is_word_based() {
    // "ride" must not match inside "pride"
    assert_eq!(normalize("other", Some("Pride parade")), pair("Other", "Other"));
  }

  #[tokio::test]
  async fn test_resolve_creates_sport_and_sportstype_once() {
    let pool = setup_test_db().await;

    let first = resolve_sportstype(&pool, "Indoor Cycling", None).await.unwrap();
    let second = resolve_sportstype(&pool, "virtualride", None).await.unwrap();

    assert_eq!(first.sportstype.id, second.sportstype.id);
    assert_eq!(first.sport.name, "Cycling");
    assert_eq!(first.sportstype.sport_id, first.sport.id);

    let sports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sports")
      .fetch_one(&pool)
      .await
      .unwrap();
    let sportstypes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sportstypes")
      .fetch_one(&pool)
      .await
      .unwrap();
    assert_eq!((sports, sportstypes), (1, 1));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_sportstypes_share_their_sport() {
    let pool = setup_test_db().await;

    let road = resolve_sportstype(&pool, "road_biking", None).await.unwrap();
    let mtb = resolve_sportstype(&pool, "mtb", None).await.unwrap();
    let new_type = resolve_sportstype(&pool, "New Type", None).await.unwrap();

    assert_eq!(road.sport.id, mtb.sport.id);
    assert_ne!(road.sportstype.id, mtb.sportstype.id);
    assert_eq!(new_type.sport.name, "New Type");
    assert_eq!(
      find_sport(&pool, "New Type").await.unwrap().map(|s| s.id),
      Some(new_type.sport.id)
    );
    assert!(find_sport(&pool, "blablubb").await.unwrap().is_none());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_resolve_reports_persistence_failure() {
    let pool = setup_test_db().await;
    pool.close().await;

    let result = resolve_sportstype(&pool, "Running", None).await;
    assert!(matches!(result, Err(StoreError::Database(_))));
  }
}
