//! Week rotation: archive the current week into last week and install new assignments.

use crate::models::{CurrentWeek, LastWeek, Player, PlayerId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Where a player sits in the new cycle (both 1-based).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Assignment {
    pub group_number: u32,
    pub position_in_group: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RotationOutcome {
    Rotated,
    /// The player already carries this cycle marker; nothing was touched.
    AlreadyRotated,
}

/// Map each grouped player to its group number and seeded position.
pub fn assignments(groups: &[Vec<PlayerId>]) -> HashMap<PlayerId, Assignment> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| {
            group.iter().enumerate().map(move |(i, &id)| {
                (
                    id,
                    Assignment {
                        group_number: g as u32 + 1,
                        position_in_group: i as u32 + 1,
                    },
                )
            })
        })
        .collect()
}

/// Rotate one player into the cycle starting at `cycle`.
///
/// Archives an assigned current week into `last_week`, clears it, then stamps
/// `assignment` if any. A player already stamped with `cycle` is left alone so
/// a retried formation cannot overwrite `last_week` with an empty week.
pub fn rotate_player(
    player: &mut Player,
    assignment: Option<Assignment>,
    cycle: DateTime<Utc>,
) -> RotationOutcome {
    if player.current_week.cycle_start == Some(cycle) {
        return RotationOutcome::AlreadyRotated;
    }

    if player.current_week.is_assigned() {
        player.last_week = LastWeek::from(&player.current_week);
    }
    player.current_week = match assignment {
        Some(a) => CurrentWeek::assigned(a.group_number, a.position_in_group, cycle),
        None => CurrentWeek::default(),
    };
    RotationOutcome::Rotated
}

/// Rotate every player in memory. Players missing from `groups` end up unassigned.
pub fn rotate(
    players: &mut [Player],
    groups: &[Vec<PlayerId>],
    cycle: DateTime<Utc>,
) -> Vec<(PlayerId, RotationOutcome)> {
    let assigned = assignments(groups);
    players
        .iter_mut()
        .map(|p| {
            let outcome = rotate_player(p, assigned.get(&p.id).copied(), cycle);
            (p.id, outcome)
        })
        .collect()
}
