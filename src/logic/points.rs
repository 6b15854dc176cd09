//! Point table: finishing position and group size to lifetime point delta.

use crate::models::Scenario;

/// Point rows by group size; index is `position - 1`.
const TABLE: [(u32, &[i32]); 3] = [
    (3, &[2, 0, -1]),
    (4, &[2, 1, 0, -1]),
    (5, &[2, 1, 0, 0, -1]),
];

/// Signed up, did not show.
pub const NO_SHOW_PENALTY: i32 = -2;
/// Played but never entered a result (forfeits to last place).
pub const NO_RESULT_PENALTY: i32 = -1;
/// Did not sign up that cycle.
pub const NOT_PLAYING_PENALTY: i32 = -1;

fn row(group_size: u32) -> Option<&'static [i32]> {
    TABLE
        .iter()
        .find(|(size, _)| *size == group_size)
        .map(|(_, row)| *row)
}

/// Points for finishing `position` (1 = best) in a group of `group_size`.
///
/// Total: pairs outside the table yield 0. Callers that accept user input
/// should check [`is_scored`] first and reject the submission instead.
pub fn points(position: u32, group_size: u32) -> i32 {
    if position == 0 {
        return 0;
    }
    row(group_size)
        .and_then(|r| r.get(position as usize - 1))
        .copied()
        .unwrap_or(0)
}

/// Whether `(position, group_size)` has an entry in the table.
pub fn is_scored(position: u32, group_size: u32) -> bool {
    position >= 1 && row(group_size).is_some_and(|r| position as usize <= r.len())
}

/// Group sizes that can be ranked.
pub fn scored_group_sizes() -> impl Iterator<Item = u32> {
    TABLE.iter().map(|(size, _)| *size)
}

/// Fixed penalty for a non-participation scenario; `None` for scored scenarios.
pub fn penalty(scenario: Scenario) -> Option<i32> {
    match scenario {
        Scenario::NoShow => Some(NO_SHOW_PENALTY),
        Scenario::NoResult => Some(NO_RESULT_PENALTY),
        Scenario::NotPlaying => Some(NOT_PLAYING_PENALTY),
        Scenario::Played | Scenario::AdminAdjustment => None,
    }
}
