//! Non-participation penalties: no-show, missing result, not signed up.

use crate::logic::points;
use crate::models::{HistoryEntry, Player, PlayerId, Scenario};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest lifetime total each penalty may push a player to. `None` means unbounded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    pub no_show_floor: Option<i32>,
    pub no_result_floor: Option<i32>,
    pub not_playing_floor: Option<i32>,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            no_show_floor: Some(0),
            no_result_floor: None,
            not_playing_floor: None,
        }
    }
}

impl PenaltyPolicy {
    pub fn floor(&self, scenario: Scenario) -> Option<i32> {
        match scenario {
            Scenario::NoShow => self.no_show_floor,
            Scenario::NoResult => self.no_result_floor,
            Scenario::NotPlaying => self.not_playing_floor,
            Scenario::Played | Scenario::AdminAdjustment => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PenaltyOutcome {
    pub player_id: PlayerId,
    pub scenario: Scenario,
    /// Delta actually applied after the floor.
    pub points: i32,
    pub new_lifetime_total: i32,
}

/// Delta that moves `current` by `penalty` without crossing `floor`.
/// A total already below the floor is never raised.
fn clamped_delta(current: i32, penalty: i32, floor: Option<i32>) -> i32 {
    match floor {
        Some(floor) => (current + penalty).max(floor.min(current)) - current,
        None => penalty,
    }
}

fn charge(
    player: &mut Player,
    scenario: Scenario,
    group_size: Option<u32>,
    policy: &PenaltyPolicy,
    cycle_marker: DateTime<Utc>,
) -> PenaltyOutcome {
    let penalty = points::penalty(scenario).unwrap_or(0);
    let delta = clamped_delta(player.lifetime_points, penalty, policy.floor(scenario));
    let position = player.current_week.final_position;
    let group_number = player.current_week.group_number;
    player.record(HistoryEntry {
        cycle_marker,
        points: delta,
        position,
        group_size,
        group_number,
        scenario,
    });
    PenaltyOutcome {
        player_id: player.id,
        scenario,
        points: delta,
        new_lifetime_total: player.lifetime_points,
    }
}

/// Signed up but did not show: penalize and take the player off next week's list.
pub fn apply_no_show(
    player: &mut Player,
    policy: &PenaltyPolicy,
    now: DateTime<Utc>,
) -> PenaltyOutcome {
    player.is_active = false;
    charge(player, Scenario::NoShow, None, policy, now)
}

/// Assigned but never submitted: forfeit to last place in a group of `group_size`.
///
/// Returns `None` when the player has nothing to forfeit (unassigned or already
/// submitted) or was already charged for this cycle.
pub fn forfeit_result(
    player: &mut Player,
    group_size: u32,
    policy: &PenaltyPolicy,
    cycle_marker: DateTime<Utc>,
) -> Option<PenaltyOutcome> {
    if !player.current_week.is_assigned()
        || player.current_week.has_submitted
        || player.has_entry(Scenario::NoResult, cycle_marker)
    {
        return None;
    }
    player.current_week.final_position = Some(group_size);
    let outcome = charge(player, Scenario::NoResult, Some(group_size), policy, cycle_marker);
    player.weeks_played += 1;
    player.current_week.has_submitted = true;
    player.current_week.points_earned_this_cycle = outcome.points;
    Some(outcome)
}

/// Not assigned this cycle: charge the not-playing penalty once per cycle.
pub fn apply_not_playing(
    player: &mut Player,
    policy: &PenaltyPolicy,
    cycle_marker: DateTime<Utc>,
) -> Option<PenaltyOutcome> {
    if player.current_week.is_assigned() || player.has_entry(Scenario::NotPlaying, cycle_marker) {
        return None;
    }
    Some(charge(player, Scenario::NotPlaying, None, policy, cycle_marker))
}
