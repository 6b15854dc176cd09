//! Read-side views of groups and the leaderboard (for API / display).

use crate::models::player::{Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One member row in a group table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub player_id: PlayerId,
    pub name: String,
    /// Seeded position at formation time.
    pub position_in_group: Option<u32>,
    pub has_submitted: bool,
    pub final_position: Option<u32>,
    pub points_earned: i32,
    pub lifetime_points: i32,
}

/// A numbered group with its members in display order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    pub group_number: u32,
    pub members: Vec<GroupMember>,
}

impl GroupView {
    /// Groups of the cycle in progress, members in seeded order.
    pub fn current(players: &[Player]) -> Vec<GroupView> {
        let mut groups: BTreeMap<u32, Vec<GroupMember>> = BTreeMap::new();
        for p in players {
            let Some(group_number) = p.current_week.group_number else {
                continue;
            };
            groups.entry(group_number).or_default().push(GroupMember {
                player_id: p.id,
                name: p.name.clone(),
                position_in_group: p.current_week.position_in_group,
                has_submitted: p.current_week.has_submitted,
                final_position: p.current_week.final_position,
                points_earned: p.current_week.points_earned_this_cycle,
                lifetime_points: p.lifetime_points,
            });
        }
        finish(groups, |m| m.position_in_group)
    }

    /// Groups of the archived cycle, members sorted by final ranking.
    pub fn last(players: &[Player]) -> Vec<GroupView> {
        let mut groups: BTreeMap<u32, Vec<GroupMember>> = BTreeMap::new();
        for p in players {
            let Some(group_number) = p.last_week.group_number else {
                continue;
            };
            groups.entry(group_number).or_default().push(GroupMember {
                player_id: p.id,
                name: p.name.clone(),
                position_in_group: p.last_week.position_in_group,
                has_submitted: p.last_week.has_submitted,
                final_position: p.last_week.final_position,
                points_earned: p.last_week.points_earned,
                lifetime_points: p.lifetime_points,
            });
        }
        finish(groups, |m| m.final_position.or(m.position_in_group))
    }
}

fn finish(
    groups: BTreeMap<u32, Vec<GroupMember>>,
    order: impl Fn(&GroupMember) -> Option<u32>,
) -> Vec<GroupView> {
    groups
        .into_iter()
        .map(|(group_number, mut members)| {
            members.sort_by_key(|m| order(m).unwrap_or(u32::MAX));
            GroupView {
                group_number,
                members,
            }
        })
        .collect()
}

/// One leaderboard row.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1 + number of players with strictly more lifetime points.
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub lifetime_points: i32,
    pub weeks_played: u32,
    pub last_week_points: i32,
    pub is_active: bool,
}

impl LeaderboardEntry {
    /// Players sorted by lifetime points (highest first), ties by name.
    pub fn build(players: &[Player]) -> Vec<LeaderboardEntry> {
        let mut sorted: Vec<&Player> = players.iter().collect();
        sorted.sort_by(|a, b| {
            b.lifetime_points
                .cmp(&a.lifetime_points)
                .then_with(|| a.name.cmp(&b.name))
        });
        let mut rows = Vec::with_capacity(sorted.len());
        let mut rank = 0;
        for (i, p) in sorted.iter().enumerate() {
            if i == 0 || sorted[i - 1].lifetime_points != p.lifetime_points {
                rank = i + 1;
            }
            rows.push(LeaderboardEntry {
                rank,
                player_id: p.id,
                name: p.name.clone(),
                lifetime_points: p.lifetime_points,
                weeks_played: p.weeks_played,
                last_week_points: p.last_week.points_earned,
                is_active: p.is_active,
            });
        }
        rows
    }
}

/// Leaderboard rows as CSV with a header line.
pub fn leaderboard_csv(rows: &[LeaderboardEntry]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
