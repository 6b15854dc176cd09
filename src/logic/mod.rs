//! Ladder engine: point table, group partitioning, week rotation, rankings, penalties, schedule.

pub mod partition;
pub mod penalty;
pub mod points;
pub mod ranking;
pub mod rotation;
pub mod schedule;

pub use partition::{partition, sort_for_partition, RankingKey, DEFAULT_GROUP_SIZE};
pub use penalty::{apply_no_show, apply_not_playing, forfeit_result, PenaltyOutcome, PenaltyPolicy};
pub use points::points;
pub use ranking::{
    adjust_lifetime_points, submit, validate_permutation, Adjustment, RankingOutcome, Submission,
    SubmissionMode,
};
pub use rotation::{assignments, rotate, rotate_player, Assignment, RotationOutcome};
pub use schedule::{AlwaysOpen, ScheduleGate, WeeklyWindow};
