//! Group formation: split the ranked active players into contiguous groups.

use crate::models::{LadderError, Player};
use serde::{Deserialize, Serialize};

/// Default target group size.
pub const DEFAULT_GROUP_SIZE: usize = 4;

/// Which field seeds the groups (highest first).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingKey {
    #[default]
    LifetimePoints,
    /// Falls back below every rated player when unset.
    Rating,
}

impl RankingKey {
    fn value(self, p: &Player) -> i64 {
        match self {
            RankingKey::LifetimePoints => i64::from(p.lifetime_points),
            RankingKey::Rating => p.rating.map(i64::from).unwrap_or(i64::MIN),
        }
    }
}

/// Stable sort by the ranking key, strongest first. Ties keep input order.
pub fn sort_for_partition(players: &mut [Player], key: RankingKey) {
    players.sort_by_key(|p| std::cmp::Reverse(key.value(p)));
}

/// Partition ordered players into groups of `group_size`.
///
/// 1. `n / group_size` contiguous full groups, strongest first.
/// 2. One leftover player joins the last full group (size `group_size + 1`).
/// 3. Two or more leftovers form a trailing group of their own.
///
/// Fails with `InsufficientPlayers` below 2 players so a one-player group is never formed.
pub fn partition<T>(players: Vec<T>, group_size: usize) -> Result<Vec<Vec<T>>, LadderError> {
    if group_size < 2 {
        return Err(LadderError::InvalidGroupSize(group_size));
    }
    let n = players.len();
    if n < 2 {
        return Err(LadderError::InsufficientPlayers { found: n });
    }

    let full = n / group_size;
    let remainder = n % group_size;

    let mut groups: Vec<Vec<T>> = Vec::with_capacity(full + 1);
    let mut iter = players.into_iter();
    for _ in 0..full {
        groups.push(iter.by_ref().take(group_size).collect());
    }
    let leftover: Vec<T> = iter.collect();

    match (remainder, groups.last_mut()) {
        (0, _) => {}
        (1, Some(last)) => last.extend(leftover),
        _ => groups.push(leftover),
    }

    Ok(groups)
}
