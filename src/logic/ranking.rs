//! Ranking submission: validate a finishing position and apply its points.

use crate::logic::points;
use crate::models::{HistoryEntry, LadderError, Player, PlayerId, Scenario};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who is submitting. Admins may overwrite an earlier submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmissionMode {
    SelfService,
    Admin,
}

/// A finishing position claimed for one player.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Submission {
    pub position: u32,
    /// Group size as claimed by the submitter.
    pub group_size: u32,
    /// Size of the group the player is actually assigned to.
    pub actual_group_size: u32,
    pub mode: SubmissionMode,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RankingOutcome {
    pub player_id: PlayerId,
    pub position: u32,
    pub group_size: u32,
    /// Points for this result (the full row value, also on a correction).
    pub points_earned: i32,
    pub new_lifetime_total: i32,
    /// An admin overwrote an earlier result; only the difference was applied.
    pub corrected: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Adjustment {
    pub old_value: i32,
    pub new_value: i32,
    pub delta: i32,
}

/// Check a submission against the player's assignment without mutating anything.
pub fn validate(player: &Player, submission: &Submission) -> Result<u32, LadderError> {
    let group_number = player
        .current_week
        .group_number
        .ok_or(LadderError::NotInGroup)?;
    if player.current_week.has_submitted && submission.mode == SubmissionMode::SelfService {
        return Err(LadderError::AlreadySubmitted);
    }
    let Submission {
        position,
        group_size,
        actual_group_size,
        ..
    } = *submission;
    if group_size != actual_group_size || !points::is_scored(position, group_size) {
        return Err(LadderError::InvalidPosition {
            position,
            group_size,
        });
    }
    Ok(group_number)
}

/// Apply a finishing position to the player's current week and lifetime total.
///
/// Rejections leave the player untouched. A first submission counts a week played
/// and logs a `Played` entry; an admin re-submission applies only the difference to
/// the earlier result and logs it as an `AdminAdjustment`.
pub fn submit(
    player: &mut Player,
    submission: Submission,
    now: DateTime<Utc>,
) -> Result<RankingOutcome, LadderError> {
    let group_number = validate(player, &submission)?;
    let Submission {
        position,
        group_size,
        ..
    } = submission;

    let earned = points::points(position, group_size);
    let corrected = player.current_week.has_submitted;
    let (delta, scenario) = if corrected {
        (
            earned - player.current_week.points_earned_this_cycle,
            Scenario::AdminAdjustment,
        )
    } else {
        player.weeks_played += 1;
        (earned, Scenario::Played)
    };

    player.record(HistoryEntry {
        cycle_marker: now,
        points: delta,
        position: Some(position),
        group_size: Some(group_size),
        group_number: Some(group_number),
        scenario,
    });
    let week = &mut player.current_week;
    week.has_submitted = true;
    week.final_position = Some(position);
    week.points_earned_this_cycle = earned;

    Ok(RankingOutcome {
        player_id: player.id,
        position,
        group_size,
        points_earned: earned,
        new_lifetime_total: player.lifetime_points,
        corrected,
    })
}

/// Batch check: `positions` must be exactly `1..=group_size`, each once.
pub fn validate_permutation(positions: &[u32], group_size: u32) -> Result<(), LadderError> {
    let invalid = LadderError::InvalidPermutation { group_size };
    if positions.len() != group_size as usize {
        return Err(invalid);
    }
    let mut seen = vec![false; group_size as usize];
    for &p in positions {
        if p == 0 || p > group_size || seen[p as usize - 1] {
            return Err(invalid);
        }
        seen[p as usize - 1] = true;
    }
    Ok(())
}

/// Admin override: set lifetime points outright and log the difference.
pub fn adjust_lifetime_points(player: &mut Player, new_value: i32, now: DateTime<Utc>) -> Adjustment {
    let old_value = player.lifetime_points;
    let delta = new_value - old_value;
    player.record(HistoryEntry {
        cycle_marker: now,
        points: delta,
        position: None,
        group_size: None,
        group_number: None,
        scenario: Scenario::AdminAdjustment,
    });
    Adjustment {
        old_value,
        new_value: player.lifetime_points,
        delta,
    }
}
