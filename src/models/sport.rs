use serde::{Deserialize, Serialize};

/// Canonical top-level activity category, e.g. "Cycling".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sport {
  pub id: i64,
  pub name: String,
}

/// Canonical specific activity label, e.g. "Mountain Biking".
/// Always belongs to exactly one sport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SportsType {
  pub id: i64,
  pub name: String,
  pub sport_id: i64,
}
