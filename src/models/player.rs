//! Player record: lifetime totals, current/last week snapshots and weekly history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player (used in groups and lookups).
pub type PlayerId = Uuid;

/// Why a history entry was written.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    Played,
    NoShow,
    NoResult,
    NotPlaying,
    AdminAdjustment,
}

/// One line of the append-only weekly log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub cycle_marker: DateTime<Utc>,
    pub points: i32,
    pub position: Option<u32>,
    pub group_size: Option<u32>,
    pub group_number: Option<u32>,
    pub scenario: Scenario,
}

/// Scratch state for the cycle in progress. All `None`/`false` when unassigned.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeek {
    pub group_number: Option<u32>,
    pub position_in_group: Option<u32>,
    pub cycle_start: Option<DateTime<Utc>>,
    pub has_submitted: bool,
    pub final_position: Option<u32>,
    pub points_earned_this_cycle: i32,
}

impl CurrentWeek {
    /// Fresh assignment at the start of a cycle.
    pub fn assigned(group_number: u32, position_in_group: u32, cycle_start: DateTime<Utc>) -> Self {
        Self {
            group_number: Some(group_number),
            position_in_group: Some(position_in_group),
            cycle_start: Some(cycle_start),
            ..Self::default()
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.group_number.is_some()
    }
}

/// Snapshot of the cycle that just finished. Overwritten wholesale on every rotation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LastWeek {
    pub group_number: Option<u32>,
    pub position_in_group: Option<u32>,
    pub cycle_start: Option<DateTime<Utc>>,
    pub has_submitted: bool,
    /// Submitted position, or the seeded position when nothing was submitted.
    pub final_position: Option<u32>,
    pub points_earned: i32,
}

impl From<&CurrentWeek> for LastWeek {
    fn from(current: &CurrentWeek) -> Self {
        Self {
            group_number: current.group_number,
            position_in_group: current.position_in_group,
            cycle_start: current.cycle_start,
            has_submitted: current.has_submitted,
            final_position: current.final_position.or(current.position_in_group),
            points_earned: current.points_earned_this_cycle,
        }
    }
}

/// A ladder participant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Identity reference from the auth layer; at most one player per user.
    pub user_id: String,
    pub name: String,
    /// Optional seeding signal, used when the ladder ranks by rating instead of points.
    pub rating: Option<i32>,
    pub lifetime_points: i32,
    pub weeks_played: u32,
    /// Signed up to play in the next formation.
    pub is_active: bool,
    pub current_week: CurrentWeek,
    pub last_week: LastWeek,
    pub history: Vec<HistoryEntry>,
    /// Optimistic concurrency counter, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Player {
    /// New opted-in player with zero points and empty week state.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into().trim().to_string(),
            rating: None,
            lifetime_points: 0,
            weeks_played: 0,
            is_active: true,
            current_week: CurrentWeek::default(),
            last_week: LastWeek::default(),
            history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rating(mut self, rating: Option<i32>) -> Self {
        self.rating = rating;
        self
    }

    /// Apply a point delta and log it. The only place lifetime points change.
    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        self.lifetime_points += entry.points;
        self.history.push(entry);
    }

    /// Sum of history deltas; equals `lifetime_points` for records built through this crate.
    pub fn history_total(&self) -> i32 {
        self.history.iter().map(|h| h.points).sum()
    }

    /// Whether a history entry for this scenario already exists for the given cycle.
    pub fn has_entry(&self, scenario: Scenario, cycle_marker: DateTime<Utc>) -> bool {
        self.history
            .iter()
            .any(|h| h.scenario == scenario && h.cycle_marker == cycle_marker)
    }
}
