//! Data structures for the ladder: players, week snapshots, group views, errors.

mod announcement;
mod error;
mod group;
mod player;

pub use announcement::Announcement;
pub use error::{LadderError, PlayerFailure};
pub use group::{leaderboard_csv, GroupMember, GroupView, LeaderboardEntry};
pub use player::{CurrentWeek, HistoryEntry, LastWeek, Player, PlayerId, Scenario};
