pub mod checker;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod exporters;
pub mod importers;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod strava;
pub mod taxonomy;

#[cfg(test)]
mod test_utils;

pub use checker::{check_all, CheckReport};
pub use reconcile::{MergePolicy, ReconcileOutcome};
pub use store::{InsertOutcome, WorkoutStore};
