//! Ladder service: the operations behind the web API.
//!
//! Every per-player mutation is a read-modify-write against the store with an
//! optimistic version check, retried a few times on conflict. Group formation
//! holds a mutex for its whole snapshot, partition and rotate sequence; a second
//! caller is turned away instead of queued.

use crate::config::LadderConfig;
use crate::logic::{
    self, assignments, partition, rotate_player, sort_for_partition, Adjustment, PenaltyOutcome,
    PenaltyPolicy, RankingKey, RankingOutcome, ScheduleGate, Submission, SubmissionMode,
};
use crate::models::{
    leaderboard_csv, Announcement, GroupMember, GroupView, LadderError, LeaderboardEntry, Player,
    PlayerFailure, PlayerId,
};
use crate::store::{JsonlStore, LadderStore, MemoryStore, StoreError};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of "now"; injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Save attempts per player before a version conflict is reported.
const SAVE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct LadderSettings {
    pub group_size: usize,
    pub ranking_key: RankingKey,
    pub penalties: PenaltyPolicy,
    /// Scheduled formation first forfeits unsubmitted results of the closing cycle.
    pub sweep_no_result_on_formation: bool,
}

impl Default for LadderSettings {
    fn default() -> Self {
        Self {
            group_size: logic::DEFAULT_GROUP_SIZE,
            ranking_key: RankingKey::default(),
            penalties: PenaltyPolicy::default(),
            sweep_no_result_on_formation: false,
        }
    }
}

impl From<&LadderConfig> for LadderSettings {
    fn from(config: &LadderConfig) -> Self {
        Self {
            group_size: config.group_size,
            ranking_key: config.ranking_key,
            penalties: config.penalties,
            sweep_no_result_on_formation: config.schedule.sweep_no_result_on_formation,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FormationReport {
    pub cycle_marker: DateTime<Utc>,
    pub groups_formed: usize,
    pub total_players: usize,
    pub groups: Vec<GroupView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupSubmissionReport {
    pub group_number: u32,
    pub successes: Vec<RankingOutcome>,
    pub failures: Vec<PlayerFailure>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    pub applied: Vec<PenaltyOutcome>,
    pub failures: Vec<PlayerFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
    pub formation_running: bool,
    pub schedule_enforced: bool,
    pub can_form_groups: bool,
    pub can_submit_ranking: bool,
    pub cycle_marker: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// One row of a batch group submission.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PositionEntry {
    pub player_id: PlayerId,
    pub position: u32,
}

/// A computed formation: one snapshot, partitioned once, applied until every rotation lands.
#[derive(Debug)]
struct FormationPlan {
    cycle: DateTime<Utc>,
    /// Every player read for this formation, grouped or not.
    snapshot: Vec<Player>,
    groups: Vec<Vec<Player>>,
}

#[derive(Debug, Default)]
struct FormationState {
    /// Plan of a formation that ended in partial failure; the next pass applies it again.
    unfinished: Option<FormationPlan>,
}

/// Clears the running flag when a formation pass ends, however it ends.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Ladder {
    store: Arc<dyn LadderStore>,
    gate: Arc<dyn ScheduleGate>,
    settings: LadderSettings,
    clock: Clock,
    formation: Mutex<FormationState>,
    /// Mirrors whether the formation lock is held, so status reads never touch the lock.
    formation_running: AtomicBool,
}

impl Ladder {
    pub fn new(store: Arc<dyn LadderStore>, gate: Arc<dyn ScheduleGate>, settings: LadderSettings) -> Self {
        Self {
            store,
            gate,
            settings,
            clock: Arc::new(Utc::now),
            formation: Mutex::new(FormationState::default()),
            formation_running: AtomicBool::new(false),
        }
    }

    /// Build from deployment configuration: JSONL store when a data dir is set, else in-memory.
    pub fn from_config(config: &LadderConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn LadderStore> = match &config.data_dir {
            Some(dir) => Arc::new(JsonlStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(store, config.schedule.gate(), LadderSettings::from(config)))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &LadderSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Load, mutate and save one player, retrying on version conflicts.
    /// A rejection from `apply` aborts without saving.
    async fn update_player<T, F>(&self, id: PlayerId, mut apply: F) -> Result<(T, Player), LadderError>
    where
        T: Send,
        F: FnMut(&mut Player) -> Result<T, LadderError> + Send,
    {
        let mut attempt = 1;
        loop {
            let mut player = self
                .store
                .player(id)
                .await?
                .ok_or(LadderError::PlayerNotFound(id))?;
            let value = apply(&mut player)?;
            match self.store.save_player(player).await {
                Ok(saved) => return Ok((value, saved)),
                Err(StoreError::Conflict(_)) if attempt < SAVE_ATTEMPTS => {
                    debug!("Version conflict on player {}, retrying ({})", id, attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn group_members(&self, group_number: u32) -> Result<Vec<Player>, LadderError> {
        Ok(self
            .store
            .players()
            .await?
            .into_iter()
            .filter(|p| p.current_week.group_number == Some(group_number))
            .collect())
    }

    /// Admin formation: runs regardless of the schedule gate.
    ///
    /// Fails with `FormationInProgress` while another pass runs. If some player
    /// updates fail the result is `PartialFailure`, and the next call re-applies
    /// the same groups for the same cycle instead of partitioning again.
    pub async fn form_groups(&self, group_size: Option<usize>) -> Result<FormationReport, LadderError> {
        let mut state = self
            .formation
            .try_lock()
            .map_err(|_| LadderError::FormationInProgress)?;
        let _running = RunningFlag::raise(&self.formation_running);
        let plan = match state.unfinished.take() {
            Some(plan) => {
                info!("Resuming unfinished formation for cycle {}", plan.cycle);
                plan
            }
            None => self.plan_formation(group_size, self.now()).await?,
        };
        self.apply_formation(&mut state, plan).await
    }

    /// Timer formation: only inside the gate's formation window, at most once per cycle.
    ///
    /// Returns `Ok(None)` when there is nothing to do.
    pub async fn scheduled_form_groups(&self) -> Result<Option<FormationReport>, LadderError> {
        let mut state = self
            .formation
            .try_lock()
            .map_err(|_| LadderError::FormationInProgress)?;
        let _running = RunningFlag::raise(&self.formation_running);
        let now = self.now();
        if !self.gate.can_form_groups(now) {
            return Ok(None);
        }
        let plan = match state.unfinished.take() {
            Some(plan) => plan,
            None => {
                let cycle = self.gate.cycle_marker(now);
                let players = self.store.players().await?;
                let formed = players
                    .iter()
                    .filter_map(|p| p.current_week.cycle_start)
                    .any(|start| start >= cycle);
                if formed {
                    debug!("Groups for cycle {} already formed", cycle);
                    return Ok(None);
                }
                if self.settings.sweep_no_result_on_formation {
                    let sweep = self.apply_no_result_sweep().await?;
                    info!(
                        "Forfeited {} missing result(s) before formation ({} failure(s))",
                        sweep.applied.len(),
                        sweep.failures.len()
                    );
                }
                self.plan_formation(None, cycle).await?
            }
        };
        self.apply_formation(&mut state, plan).await.map(Some)
    }

    /// Read one snapshot and partition its active players.
    async fn plan_formation(
        &self,
        group_size: Option<usize>,
        cycle: DateTime<Utc>,
    ) -> Result<FormationPlan, LadderError> {
        let group_size = group_size.unwrap_or(self.settings.group_size);
        let snapshot = self.store.players().await?;

        let mut active: Vec<Player> = snapshot.iter().filter(|p| p.is_active).cloned().collect();
        sort_for_partition(&mut active, self.settings.ranking_key);
        let groups = partition(active, group_size)?;
        Ok(FormationPlan {
            cycle,
            snapshot,
            groups,
        })
    }

    /// Rotate every snapshot player into the plan's groups.
    ///
    /// Players already on the plan's cycle are left alone and players deleted since
    /// the snapshot are skipped. Any other failure parks the plan for the next call.
    async fn apply_formation(
        &self,
        state: &mut FormationState,
        plan: FormationPlan,
    ) -> Result<FormationReport, LadderError> {
        let cycle = plan.cycle;
        let total_players: usize = plan.groups.iter().map(Vec::len).sum();
        let ids: Vec<Vec<PlayerId>> = plan
            .groups
            .iter()
            .map(|g| g.iter().map(|p| p.id).collect())
            .collect();
        let assigned = assignments(&ids);
        info!(
            "Forming {} group(s) with {} player(s) for cycle {}",
            ids.len(),
            total_players,
            cycle
        );

        let mut applied = 0;
        let mut failures = Vec::new();
        for p in &plan.snapshot {
            let assignment = assigned.get(&p.id).copied();
            match self
                .update_player(p.id, |player| Ok(rotate_player(player, assignment, cycle)))
                .await
            {
                Ok(_) => applied += 1,
                Err(LadderError::PlayerNotFound(_)) => {
                    debug!("Player {} removed since the snapshot, skipping", p.id);
                }
                Err(e) => {
                    warn!("Rotation failed for player {} ({}): {}", p.id, p.name, e);
                    failures.push(PlayerFailure::new(p.id, &e));
                }
            }
        }

        if !failures.is_empty() {
            warn!(
                "Formation for cycle {} incomplete: {} applied, {} failed",
                cycle,
                applied,
                failures.len()
            );
            state.unfinished = Some(plan);
            return Err(LadderError::PartialFailure { applied, failures });
        }

        let groups: Vec<GroupView> = plan
            .groups
            .iter()
            .enumerate()
            .map(|(g, members)| GroupView {
                group_number: g as u32 + 1,
                members: members
                    .iter()
                    .enumerate()
                    .map(|(i, p)| GroupMember {
                        player_id: p.id,
                        name: p.name.clone(),
                        position_in_group: Some(i as u32 + 1),
                        has_submitted: false,
                        final_position: None,
                        points_earned: 0,
                        lifetime_points: p.lifetime_points,
                    })
                    .collect(),
            })
            .collect();
        info!("Groups formed successfully: {} group(s)", groups.len());
        Ok(FormationReport {
            cycle_marker: cycle,
            groups_formed: groups.len(),
            total_players,
            groups,
        })
    }

    /// Self-service submission, subject to the schedule gate.
    pub async fn submit_ranking(
        &self,
        player_id: PlayerId,
        position: u32,
        group_size: u32,
    ) -> Result<RankingOutcome, LadderError> {
        if !self.gate.can_submit_ranking(self.now()) {
            return Err(LadderError::SubmissionWindowClosed);
        }
        self.record_ranking(player_id, position, group_size, SubmissionMode::SelfService)
            .await
    }

    /// Admin submission on a player's behalf: ignores the gate and may overwrite an earlier result.
    pub async fn admin_submit_ranking(
        &self,
        player_id: PlayerId,
        position: u32,
        group_size: u32,
    ) -> Result<RankingOutcome, LadderError> {
        self.record_ranking(player_id, position, group_size, SubmissionMode::Admin)
            .await
    }

    async fn record_ranking(
        &self,
        player_id: PlayerId,
        position: u32,
        group_size: u32,
        mode: SubmissionMode,
    ) -> Result<RankingOutcome, LadderError> {
        let now = self.now();
        let player = self
            .store
            .player(player_id)
            .await?
            .ok_or(LadderError::PlayerNotFound(player_id))?;
        let group_number = player
            .current_week
            .group_number
            .ok_or(LadderError::NotInGroup)?;
        let actual_group_size = self.group_members(group_number).await?.len() as u32;
        let submission = Submission {
            position,
            group_size,
            actual_group_size,
            mode,
        };

        let (outcome, _) = self
            .update_player(player_id, |p| logic::submit(p, submission, now))
            .await?;
        info!(
            "Player {} submitted ranking: position {}/{}, points {}",
            player.name, position, group_size, outcome.points_earned
        );
        Ok(outcome)
    }

    /// Admin batch entry for a whole group.
    ///
    /// The entries must cover every member exactly once with positions `1..=size`,
    /// otherwise nothing is applied. After that each player is applied on its own
    /// and failures are reported next to the successes.
    pub async fn admin_submit_group_rankings(
        &self,
        group_number: u32,
        entries: &[PositionEntry],
    ) -> Result<GroupSubmissionReport, LadderError> {
        let now = self.now();
        let members = self.group_members(group_number).await?;
        if members.is_empty() {
            return Err(LadderError::GroupNotFound(group_number));
        }
        let group_size = members.len() as u32;

        let member_ids: HashSet<PlayerId> = members.iter().map(|p| p.id).collect();
        let entry_ids: HashSet<PlayerId> = entries.iter().map(|e| e.player_id).collect();
        if entry_ids.len() != entries.len() || entry_ids != member_ids {
            return Err(LadderError::InvalidPermutation { group_size });
        }
        let positions: Vec<u32> = entries.iter().map(|e| e.position).collect();
        logic::validate_permutation(&positions, group_size)?;

        let mut report = GroupSubmissionReport {
            group_number,
            successes: Vec::with_capacity(entries.len()),
            failures: Vec::new(),
        };
        for entry in entries {
            let submission = Submission {
                position: entry.position,
                group_size,
                actual_group_size: group_size,
                mode: SubmissionMode::Admin,
            };
            match self
                .update_player(entry.player_id, |p| logic::submit(p, submission, now))
                .await
            {
                Ok((outcome, _)) => report.successes.push(outcome),
                Err(e) => {
                    warn!("Group {} submission failed for {}: {}", group_number, entry.player_id, e);
                    report.failures.push(PlayerFailure::new(entry.player_id, &e));
                }
            }
        }
        info!(
            "Group {} rankings entered: {} ok, {} failed",
            group_number,
            report.successes.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Admin override of a lifetime total.
    pub async fn adjust_lifetime_points(
        &self,
        player_id: PlayerId,
        new_value: i32,
    ) -> Result<Adjustment, LadderError> {
        let now = self.now();
        let (adjustment, player) = self
            .update_player(player_id, |p| Ok(logic::adjust_lifetime_points(p, new_value, now)))
            .await?;
        info!(
            "Lifetime points of {} set from {} to {}",
            player.name, adjustment.old_value, adjustment.new_value
        );
        Ok(adjustment)
    }

    pub async fn apply_no_show(&self, player_id: PlayerId) -> Result<PenaltyOutcome, LadderError> {
        let now = self.now();
        let policy = self.settings.penalties;
        let (outcome, player) = self
            .update_player(player_id, |p| Ok(logic::apply_no_show(p, &policy, now)))
            .await?;
        info!(
            "No-show for {}: {} point(s), total {}",
            player.name, outcome.points, outcome.new_lifetime_total
        );
        Ok(outcome)
    }

    /// Forfeit every assigned, unsubmitted player to last place. Safe to repeat.
    pub async fn apply_no_result_sweep(&self) -> Result<SweepReport, LadderError> {
        let now = self.now();
        let policy = self.settings.penalties;
        let players = self.store.players().await?;
        let mut sizes: HashMap<u32, u32> = HashMap::new();
        for group_number in players.iter().filter_map(|p| p.current_week.group_number) {
            *sizes.entry(group_number).or_default() += 1;
        }

        let mut report = SweepReport::default();
        for p in players
            .iter()
            .filter(|p| p.current_week.is_assigned() && !p.current_week.has_submitted)
        {
            let result = self
                .update_player(p.id, |player| {
                    let Some(group_number) = player.current_week.group_number else {
                        return Ok(None);
                    };
                    let size = sizes.get(&group_number).copied().unwrap_or(1);
                    let marker = player.current_week.cycle_start.unwrap_or(now);
                    Ok(logic::forfeit_result(player, size, &policy, marker))
                })
                .await;
            match result {
                Ok((Some(outcome), _)) => report.applied.push(outcome),
                Ok((None, _)) => {}
                Err(e) => report.failures.push(PlayerFailure::new(p.id, &e)),
            }
        }
        info!(
            "No-result sweep: {} penalised, {} failed",
            report.applied.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Charge every player without an assignment in the current cycle. Safe to repeat.
    pub async fn apply_not_playing_sweep(&self) -> Result<SweepReport, LadderError> {
        let policy = self.settings.penalties;
        let players = self.store.players().await?;
        let Some(cycle) = players
            .iter()
            .filter_map(|p| p.current_week.cycle_start)
            .max()
        else {
            info!("Not-playing sweep skipped: no cycle has been formed yet");
            return Ok(SweepReport::default());
        };

        let mut report = SweepReport::default();
        for p in players.iter().filter(|p| !p.current_week.is_assigned()) {
            match self
                .update_player(p.id, |player| Ok(logic::apply_not_playing(player, &policy, cycle)))
                .await
            {
                Ok((Some(outcome), _)) => report.applied.push(outcome),
                Ok((None, _)) => {}
                Err(e) => report.failures.push(PlayerFailure::new(p.id, &e)),
            }
        }
        info!(
            "Not-playing sweep for cycle {}: {} penalised, {} failed",
            cycle,
            report.applied.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Opt in as a new player (active immediately).
    pub async fn register_self(&self, user_id: &str, name: &str) -> Result<Player, LadderError> {
        self.add_player(user_id, name, None, None).await
    }

    /// Admin add. Starting points are logged as an adjustment so history sums to the total.
    pub async fn add_player(
        &self,
        user_id: &str,
        name: &str,
        rating: Option<i32>,
        starting_points: Option<i32>,
    ) -> Result<Player, LadderError> {
        if name.trim().is_empty() {
            return Err(LadderError::InvalidName);
        }
        let mut player = Player::new(user_id, name).with_rating(rating);
        if let Some(points) = starting_points.filter(|p| *p != 0) {
            logic::adjust_lifetime_points(&mut player, points, self.now());
        }
        let player = self.store.insert_player(player).await.map_err(|e| match e {
            StoreError::DuplicateUser(_) => LadderError::DuplicatePlayer,
            e => e.into(),
        })?;
        info!("Player {} created for user {}", player.name, player.user_id);
        Ok(player)
    }

    pub async fn set_active(&self, player_id: PlayerId, is_active: bool) -> Result<Player, LadderError> {
        let (_, player) = self
            .update_player(player_id, |p| {
                p.is_active = is_active;
                Ok(())
            })
            .await?;
        info!("Player {} is now {}", player.name, if is_active { "playing" } else { "not playing" });
        Ok(player)
    }

    pub async fn remove_player(&self, player_id: PlayerId) -> Result<Player, LadderError> {
        let removed = self
            .store
            .delete_player(player_id)
            .await?
            .ok_or(LadderError::PlayerNotFound(player_id))?;
        info!("Player {} removed", removed.name);
        Ok(removed)
    }

    pub async fn player(&self, player_id: PlayerId) -> Result<Player, LadderError> {
        self.store
            .player(player_id)
            .await?
            .ok_or(LadderError::PlayerNotFound(player_id))
    }

    pub async fn player_for_user(&self, user_id: &str) -> Result<Option<Player>, LadderError> {
        Ok(self.store.player_by_user(user_id).await?)
    }

    pub async fn current_groups(&self) -> Result<Vec<GroupView>, LadderError> {
        Ok(GroupView::current(&self.store.players().await?))
    }

    pub async fn last_groups(&self) -> Result<Vec<GroupView>, LadderError> {
        Ok(GroupView::last(&self.store.players().await?))
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, LadderError> {
        Ok(LeaderboardEntry::build(&self.store.players().await?))
    }

    pub async fn leaderboard_csv(&self) -> Result<String, LadderError> {
        let rows = self.leaderboard().await?;
        leaderboard_csv(&rows).map_err(|e| LadderError::Store(StoreError::Io(e.into())))
    }

    pub async fn status(&self) -> SchedulerStatus {
        let now = self.now();
        SchedulerStatus {
            formation_running: self.formation_running.load(Ordering::SeqCst),
            schedule_enforced: self.gate.is_enforced(),
            can_form_groups: self.gate.can_form_groups(now),
            can_submit_ranking: self.gate.can_submit_ranking(now),
            cycle_marker: self.gate.cycle_marker(now),
            now,
        }
    }

    /// Stored announcement, or the default text when none was saved yet.
    pub async fn announcement(&self) -> Result<Announcement, LadderError> {
        Ok(self.store.announcement().await?.unwrap_or_default())
    }

    pub async fn update_announcement(
        &self,
        title: &str,
        date: &str,
        content: &str,
        updated_by: &str,
    ) -> Result<Announcement, LadderError> {
        for (field, value) in [("title", title), ("date", date), ("content", content)] {
            if value.trim().is_empty() {
                return Err(LadderError::MissingField(field));
            }
        }
        let announcement = Announcement {
            title: title.trim().to_string(),
            date: date.trim().to_string(),
            content: content.to_string(),
            updated_by: Some(updated_by.to_string()),
            updated_at: self.now(),
        };
        Ok(self.store.save_announcement(announcement).await?)
    }
}
