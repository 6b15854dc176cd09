//! Doubles ladder: weekly groups, finishing-position rankings and lifetime points.

pub mod config;
pub mod ladder;
pub mod logic;
pub mod models;
pub mod store;

pub use config::{ConfigError, LadderConfig, ScheduleConfig};
pub use ladder::{
    Clock, FormationReport, GroupSubmissionReport, Ladder, LadderSettings, PositionEntry,
    SchedulerStatus, SweepReport,
};
pub use logic::{AlwaysOpen, PenaltyPolicy, RankingKey, ScheduleGate, WeeklyWindow};
pub use models::{
    Announcement, GroupView, LadderError, LeaderboardEntry, Player, PlayerFailure, PlayerId,
    Scenario,
};
pub use store::{JsonlStore, LadderStore, MemoryStore, StoreError};
