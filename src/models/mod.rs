pub mod sport;
pub mod sync_state;
pub mod workout;

pub use sport::{Sport, SportsType};
pub use sync_state::SyncState;
pub use workout::{
  NewWorkout, ReconcileState, TimeRange, Workout, WorkoutAttributes, DATETIME_FORMAT,
  MERGED_SOURCE,
};
