//! Integration tests for the ladder service over in-memory and instrumented stores.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use doubles_ladder::{
    AlwaysOpen, Announcement, Clock, Ladder, LadderError, LadderSettings, LadderStore,
    MemoryStore, Player, PlayerId, PositionEntry, Scenario, StoreError, WeeklyWindow,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

fn open_ladder(store: Arc<dyn LadderStore>) -> Ladder {
    Ladder::new(store, Arc::new(AlwaysOpen), LadderSettings::default())
}

fn memory_ladder() -> Ladder {
    open_ladder(Arc::new(MemoryStore::new()))
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Clock that tests can move.
fn movable_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
    let time = Arc::new(Mutex::new(start));
    let handle = time.clone();
    let clock: Clock = Arc::new(move || *handle.lock().unwrap());
    (clock, time)
}

async fn add_players(ladder: &Ladder, points: &[i32]) -> Vec<Player> {
    let mut players = Vec::new();
    for (i, &p) in points.iter().enumerate() {
        let player = ladder
            .add_player(&format!("user{i}"), &format!("Player {i}"), None, Some(p))
            .await
            .unwrap();
        players.push(player);
    }
    players
}

/// Wraps a memory store; the first armed `players()` call parks until released.
struct SlowStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl LadderStore for SlowStore {
    async fn players(&self) -> Result<Vec<Player>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.players().await
    }
    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        self.inner.player(id).await
    }
    async fn player_by_user(&self, user_id: &str) -> Result<Option<Player>, StoreError> {
        self.inner.player_by_user(user_id).await
    }
    async fn insert_player(&self, player: Player) -> Result<Player, StoreError> {
        self.inner.insert_player(player).await
    }
    async fn save_player(&self, player: Player) -> Result<Player, StoreError> {
        self.inner.save_player(player).await
    }
    async fn delete_player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        self.inner.delete_player(id).await
    }
    async fn announcement(&self) -> Result<Option<Announcement>, StoreError> {
        self.inner.announcement().await
    }
    async fn save_announcement(&self, a: Announcement) -> Result<Announcement, StoreError> {
        self.inner.save_announcement(a).await
    }
}

/// Wraps a memory store; saves fail for chosen players, or report conflicts a set number of times.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<PlayerId>>,
    conflicts: AtomicUsize,
}

#[async_trait]
impl LadderStore for FlakyStore {
    async fn players(&self) -> Result<Vec<Player>, StoreError> {
        self.inner.players().await
    }
    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        self.inner.player(id).await
    }
    async fn player_by_user(&self, user_id: &str) -> Result<Option<Player>, StoreError> {
        self.inner.player_by_user(user_id).await
    }
    async fn insert_player(&self, player: Player) -> Result<Player, StoreError> {
        self.inner.insert_player(player).await
    }
    async fn save_player(&self, player: Player) -> Result<Player, StoreError> {
        if self.failing.lock().unwrap().contains(&player.id) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict(player.id));
        }
        self.inner.save_player(player).await
    }
    async fn delete_player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        self.inner.delete_player(id).await
    }
    async fn announcement(&self) -> Result<Option<Announcement>, StoreError> {
        self.inner.announcement().await
    }
    async fn save_announcement(&self, a: Announcement) -> Result<Announcement, StoreError> {
        self.inner.save_announcement(a).await
    }
}

#[tokio::test]
async fn full_cycle_of_five_players() {
    let ladder = memory_ladder();
    let players = add_players(&ladder, &[2, 6, 10, 4, 8]).await;

    let report = ladder.form_groups(Some(4)).await.unwrap();
    assert_eq!(report.groups_formed, 1);
    assert_eq!(report.total_players, 5);
    let seeded: Vec<i32> = report.groups[0]
        .members
        .iter()
        .map(|m| m.lifetime_points)
        .collect();
    assert_eq!(seeded, vec![10, 8, 6, 4, 2]);

    for (i, member) in report.groups[0].members.iter().enumerate() {
        ladder
            .submit_ranking(member.player_id, i as u32 + 1, 5)
            .await
            .unwrap();
    }

    let board = ladder.leaderboard().await.unwrap();
    let totals: Vec<i32> = board.iter().map(|r| r.lifetime_points).collect();
    assert_eq!(totals, vec![12, 9, 6, 4, 1]);
    for p in &players {
        let p = ladder.player(p.id).await.unwrap();
        assert_eq!(p.weeks_played, 1);
        assert_eq!(p.history_total(), p.lifetime_points);
    }
}

#[tokio::test]
async fn submission_rejects_wrong_group_size() {
    let ladder = memory_ladder();
    add_players(&ladder, &[3, 2, 1]).await;
    let report = ladder.form_groups(None).await.unwrap();
    let id = report.groups[0].members[0].player_id;
    assert!(matches!(
        ladder.submit_ranking(id, 1, 4).await,
        Err(LadderError::InvalidPosition { .. })
    ));
    assert_eq!(ladder.player(id).await.unwrap().lifetime_points, 3);
    ladder.submit_ranking(id, 1, 3).await.unwrap();
}

#[tokio::test]
async fn formation_needs_two_active_players() {
    let ladder = memory_ladder();
    let players = add_players(&ladder, &[0, 0]).await;
    ladder.set_active(players[1].id, false).await.unwrap();
    assert!(matches!(
        ladder.form_groups(None).await,
        Err(LadderError::InsufficientPlayers { found: 1 })
    ));
    assert!(!ladder.player(players[0].id).await.unwrap().current_week.is_assigned());
}

#[tokio::test]
async fn second_formation_is_rejected_while_first_runs() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        armed: AtomicBool::new(false),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let ladder = Arc::new(open_ladder(store.clone()));
    add_players(&ladder, &[4, 3, 2, 1]).await;
    store.armed.store(true, Ordering::SeqCst);

    let first = tokio::spawn({
        let ladder = ladder.clone();
        async move { ladder.form_groups(None).await }
    });
    store.entered.notified().await;

    assert!(ladder.status().await.formation_running);
    assert!(matches!(
        ladder.form_groups(None).await,
        Err(LadderError::FormationInProgress)
    ));
    assert!(matches!(
        ladder.scheduled_form_groups().await,
        Err(LadderError::FormationInProgress)
    ));

    store.release.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.total_players, 4);
    assert!(!ladder.status().await.formation_running);
}

#[tokio::test]
async fn partial_rotation_is_reported_and_retry_finishes_same_cycle() {
    let store = Arc::new(FlakyStore::default());
    let ladder = open_ladder(store.clone());
    add_players(&ladder, &[4, 3, 2, 1]).await;

    let first = ladder.form_groups(None).await.unwrap();
    for (i, m) in first.groups[0].members.iter().enumerate() {
        ladder.submit_ranking(m.player_id, i as u32 + 1, 4).await.unwrap();
    }

    let stuck = first.groups[0].members[2].player_id;
    store.failing.lock().unwrap().insert(stuck);
    match ladder.form_groups(None).await {
        Err(LadderError::PartialFailure { applied, failures }) => {
            assert_eq!(applied, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].player_id, stuck);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }

    store.failing.lock().unwrap().clear();
    let retry = ladder.form_groups(None).await.unwrap();
    assert_eq!(retry.total_players, 4);

    let players = store.players().await.unwrap();
    let markers: HashSet<_> = players.iter().map(|p| p.current_week.cycle_start).collect();
    assert_eq!(markers, HashSet::from([Some(retry.cycle_marker)]));
    for p in &players {
        assert!(p.last_week.has_submitted, "{} lost its archived week", p.name);
        assert!(p.last_week.final_position.is_some());
        assert!(!p.current_week.has_submitted);
    }
}

#[tokio::test]
async fn retry_after_partial_failure_keeps_the_original_groups() {
    let store = Arc::new(FlakyStore::default());
    let ladder = open_ladder(store.clone());
    let players = add_players(&ladder, &[10, 8, 6, 4, 2]).await;

    store.failing.lock().unwrap().insert(players[4].id);
    match ladder.form_groups(None).await {
        Err(LadderError::PartialFailure { applied, failures }) => {
            assert_eq!(applied, 4);
            assert_eq!(failures[0].player_id, players[4].id);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }

    store.failing.lock().unwrap().clear();
    ladder.set_active(players[3].id, false).await.unwrap();
    let retry = ladder.form_groups(None).await.unwrap();
    assert_eq!(retry.groups_formed, 1);
    assert_eq!(retry.total_players, 5);

    let groups = ladder.current_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    let positions: Vec<Option<u32>> = groups[0].members.iter().map(|m| m.position_in_group).collect();
    assert_eq!(positions, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    let order: Vec<PlayerId> = groups[0].members.iter().map(|m| m.player_id).collect();
    assert_eq!(order, players.iter().map(|p| p.id).collect::<Vec<_>>());
    for p in store.players().await.unwrap() {
        assert_eq!(p.current_week.cycle_start, Some(retry.cycle_marker));
    }

    let outcome = ladder.submit_ranking(players[3].id, 4, 5).await.unwrap();
    assert_eq!(outcome.points_earned, 0);
}

#[tokio::test]
async fn version_conflicts_are_retried() {
    let store = Arc::new(FlakyStore::default());
    let ladder = open_ladder(store.clone());
    let players = add_players(&ladder, &[10]).await;

    store.conflicts.store(2, Ordering::SeqCst);
    let adj = ladder.adjust_lifetime_points(players[0].id, 15).await.unwrap();
    assert_eq!(adj.delta, 5);

    store.conflicts.store(3, Ordering::SeqCst);
    assert!(matches!(
        ladder.adjust_lifetime_points(players[0].id, 20).await,
        Err(LadderError::Store(StoreError::Conflict(_)))
    ));
    let p = ladder.player(players[0].id).await.unwrap();
    assert_eq!(p.lifetime_points, 15);
    assert_eq!(p.weeks_played, 0);
    assert_eq!(p.history.last().unwrap().scenario, Scenario::AdminAdjustment);
}

#[tokio::test]
async fn concurrent_submissions_for_one_player_score_once() {
    let ladder = memory_ladder();
    add_players(&ladder, &[0, 0, 0, 0]).await;
    let report = ladder.form_groups(None).await.unwrap();
    let id = report.groups[0].members[0].player_id;

    let (a, b) = tokio::join!(ladder.submit_ranking(id, 1, 4), ladder.submit_ranking(id, 1, 4));
    let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1);
    assert!(matches!(a.err().or(b.err()), Some(LadderError::AlreadySubmitted)));

    let p = ladder.player(id).await.unwrap();
    assert_eq!(p.lifetime_points, 2);
    assert_eq!(p.weeks_played, 1);
}

#[tokio::test]
async fn admin_batch_submission_for_a_group() {
    let ladder = memory_ladder();
    add_players(&ladder, &[8, 6, 4, 2]).await;
    let report = ladder.form_groups(None).await.unwrap();
    let ids: Vec<PlayerId> = report.groups[0].members.iter().map(|m| m.player_id).collect();

    let duplicate: Vec<PositionEntry> = ids
        .iter()
        .map(|&player_id| PositionEntry { player_id, position: 1 })
        .collect();
    assert!(matches!(
        ladder.admin_submit_group_rankings(1, &duplicate).await,
        Err(LadderError::InvalidPermutation { group_size: 4 })
    ));
    assert!(matches!(
        ladder.admin_submit_group_rankings(1, &duplicate[..3]).await,
        Err(LadderError::InvalidPermutation { .. })
    ));
    assert!(matches!(
        ladder.admin_submit_group_rankings(7, &duplicate).await,
        Err(LadderError::GroupNotFound(7))
    ));
    assert_eq!(ladder.player(ids[0]).await.unwrap().lifetime_points, 8);

    // Reverse the seeding: weakest wins.
    let entries: Vec<PositionEntry> = ids
        .iter()
        .enumerate()
        .map(|(i, &player_id)| PositionEntry {
            player_id,
            position: 4 - i as u32,
        })
        .collect();
    let result = ladder.admin_submit_group_rankings(1, &entries).await.unwrap();
    assert_eq!(result.successes.len(), 4);
    assert!(result.failures.is_empty());

    let totals: Vec<i32> = totals_of(&ladder, &ids).await;
    assert_eq!(totals, vec![7, 6, 5, 4]);

    let current = ladder.current_groups().await.unwrap();
    assert!(current[0].members.iter().all(|m| m.has_submitted));
}

async fn totals_of(ladder: &Ladder, ids: &[PlayerId]) -> Vec<i32> {
    let mut totals = Vec::new();
    for id in ids {
        totals.push(ladder.player(*id).await.unwrap().lifetime_points);
    }
    totals
}

#[tokio::test]
async fn admin_correction_applies_difference() {
    let ladder = memory_ladder();
    add_players(&ladder, &[10, 0, 0]).await;
    let report = ladder.form_groups(None).await.unwrap();
    let id = report.groups[0].members[0].player_id;

    ladder.submit_ranking(id, 1, 3).await.unwrap();
    let outcome = ladder.admin_submit_ranking(id, 3, 3).await.unwrap();
    assert!(outcome.corrected);
    let p = ladder.player(id).await.unwrap();
    assert_eq!(p.lifetime_points, 9);
    assert_eq!(p.weeks_played, 1);
    assert_eq!(p.history_total(), p.lifetime_points);
}

#[tokio::test]
async fn weekly_window_gates_submission_and_scheduled_formation() {
    let store: Arc<dyn LadderStore> = Arc::new(MemoryStore::new());
    let (clock, time) = movable_clock(utc(2026, 10, 15, 20, 0));
    let ladder = Ladder::new(
        store,
        Arc::new(WeeklyWindow::thursday_evening()),
        LadderSettings::default(),
    )
    .with_clock(clock);
    add_players(&ladder, &[3, 2, 1, 0]).await;

    // Thursday afternoon: neither window is open.
    assert!(ladder.scheduled_form_groups().await.unwrap().is_none());
    let report = ladder.form_groups(None).await.unwrap();
    let id = report.groups[0].members[0].player_id;
    assert!(matches!(
        ladder.submit_ranking(id, 1, 4).await,
        Err(LadderError::SubmissionWindowClosed)
    ));
    ladder.admin_submit_ranking(id, 1, 4).await.unwrap();

    *time.lock().unwrap() = utc(2026, 10, 16, 1, 30);
    let scheduled = ladder.scheduled_form_groups().await.unwrap().unwrap();
    assert_eq!(scheduled.cycle_marker, utc(2026, 10, 16, 1, 1));
    assert_eq!(scheduled.groups_formed, 1);
    assert!(ladder.scheduled_form_groups().await.unwrap().is_none());

    let status = ladder.status().await;
    assert!(status.schedule_enforced);
    assert!(status.can_form_groups);
    assert!(status.can_submit_ranking);
    assert_eq!(status.cycle_marker, utc(2026, 10, 16, 1, 1));

    let first = scheduled.groups[0].members[0].player_id;
    ladder.submit_ranking(first, 1, 4).await.unwrap();
}

#[tokio::test]
async fn scheduled_formation_can_forfeit_missing_results_first() {
    let store: Arc<dyn LadderStore> = Arc::new(MemoryStore::new());
    let (clock, time) = movable_clock(utc(2026, 10, 9, 1, 30));
    let settings = LadderSettings {
        sweep_no_result_on_formation: true,
        ..LadderSettings::default()
    };
    let ladder = Ladder::new(store, Arc::new(WeeklyWindow::thursday_evening()), settings)
        .with_clock(clock);
    add_players(&ladder, &[3, 2, 1]).await;

    let first = ladder.scheduled_form_groups().await.unwrap().unwrap();
    let winner = first.groups[0].members[0].player_id;
    ladder.submit_ranking(winner, 1, 3).await.unwrap();

    *time.lock().unwrap() = utc(2026, 10, 16, 1, 30);
    ladder.scheduled_form_groups().await.unwrap().unwrap();

    for m in &first.groups[0].members[1..] {
        let p = ladder.player(m.player_id).await.unwrap();
        assert_eq!(p.last_week.points_earned, -1);
        assert_eq!(p.last_week.final_position, Some(3));
        assert!(p.history.iter().any(|h| h.scenario == Scenario::NoResult));
    }
    let w = ladder.player(winner).await.unwrap();
    assert_eq!(w.last_week.points_earned, 2);
}

#[tokio::test]
async fn sweeps_are_idempotent_per_cycle() {
    let ladder = memory_ladder();
    let players = add_players(&ladder, &[5, 4, 3, 2, 1]).await;
    ladder.set_active(players[4].id, false).await.unwrap();
    let report = ladder.form_groups(None).await.unwrap();
    let ids: Vec<PlayerId> = report.groups[0].members.iter().map(|m| m.player_id).collect();
    ladder.submit_ranking(ids[0], 1, 4).await.unwrap();
    ladder.submit_ranking(ids[1], 2, 4).await.unwrap();

    let sweep = ladder.apply_no_result_sweep().await.unwrap();
    assert_eq!(sweep.applied.len(), 2);
    assert!(sweep.failures.is_empty());
    for id in &ids[2..] {
        let p = ladder.player(*id).await.unwrap();
        assert_eq!(p.current_week.final_position, Some(4));
        assert!(p.current_week.has_submitted);
    }
    assert!(ladder.apply_no_result_sweep().await.unwrap().applied.is_empty());

    let not_playing = ladder.apply_not_playing_sweep().await.unwrap();
    assert_eq!(not_playing.applied.len(), 1);
    assert_eq!(not_playing.applied[0].player_id, players[4].id);
    assert_eq!(not_playing.applied[0].new_lifetime_total, 0);
    assert!(ladder.apply_not_playing_sweep().await.unwrap().applied.is_empty());
}

#[tokio::test]
async fn not_playing_sweep_before_any_formation_charges_nobody() {
    let (clock, time) = movable_clock(utc(2024, 3, 7, 12, 0));
    let ladder = memory_ladder().with_clock(clock);
    let players = add_players(&ladder, &[5, 3]).await;

    assert!(ladder.apply_not_playing_sweep().await.unwrap().applied.is_empty());
    *time.lock().unwrap() = utc(2024, 3, 7, 12, 1);
    let again = ladder.apply_not_playing_sweep().await.unwrap();
    assert!(again.applied.is_empty());
    assert!(again.failures.is_empty());

    for (p, expected) in players.iter().zip([5, 3]) {
        let p = ladder.player(p.id).await.unwrap();
        assert_eq!(p.lifetime_points, expected);
        assert!(!p.history.iter().any(|h| h.scenario == Scenario::NotPlaying));
    }
}

#[tokio::test]
async fn no_show_deactivates_and_floors() {
    let ladder = memory_ladder();
    let players = add_players(&ladder, &[1]).await;
    let outcome = ladder.apply_no_show(players[0].id).await.unwrap();
    assert_eq!(outcome.points, -1);
    assert_eq!(outcome.new_lifetime_total, 0);
    assert!(!ladder.player(players[0].id).await.unwrap().is_active);
}

#[tokio::test]
async fn player_management() {
    let ladder = memory_ladder();
    let me = ladder.register_self("u1", "  Ana  ").await.unwrap();
    assert_eq!(me.name, "Ana");
    assert!(me.is_active);
    assert!(matches!(
        ladder.register_self("u1", "Ana again").await,
        Err(LadderError::DuplicatePlayer)
    ));
    assert!(matches!(
        ladder.register_self("u2", "   ").await,
        Err(LadderError::InvalidName)
    ));

    let seeded = ladder.add_player("u3", "Ben", Some(1500), Some(10)).await.unwrap();
    assert_eq!(seeded.lifetime_points, 10);
    assert_eq!(seeded.history_total(), 10);
    assert_eq!(seeded.rating, Some(1500));

    assert_eq!(ladder.player_for_user("u1").await.unwrap().map(|p| p.id), Some(me.id));
    ladder.remove_player(me.id).await.unwrap();
    assert!(ladder.player_for_user("u1").await.unwrap().is_none());
    assert!(matches!(
        ladder.remove_player(me.id).await,
        Err(LadderError::PlayerNotFound(_))
    ));
}

#[tokio::test]
async fn leaderboard_uses_competition_ranking() {
    let ladder = memory_ladder();
    add_players(&ladder, &[5, 10, 10]).await;
    let board = ladder.leaderboard().await.unwrap();
    let ranks: Vec<usize> = board.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 1, 3]);

    let csv = ladder.leaderboard_csv().await.unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("rank,player_id,name,lifetime_points,weeks_played,last_week_points,is_active")
    );
    assert_eq!(lines.count(), 3);
}

#[tokio::test]
async fn last_groups_sorted_by_final_position() {
    let ladder = memory_ladder();
    add_players(&ladder, &[3, 2, 1]).await;
    let report = ladder.form_groups(None).await.unwrap();
    let ids: Vec<PlayerId> = report.groups[0].members.iter().map(|m| m.player_id).collect();
    ladder.submit_ranking(ids[0], 3, 3).await.unwrap();
    ladder.submit_ranking(ids[1], 1, 3).await.unwrap();
    ladder.submit_ranking(ids[2], 2, 3).await.unwrap();
    ladder.form_groups(None).await.unwrap();

    let last = ladder.last_groups().await.unwrap();
    let order: Vec<PlayerId> = last[0].members.iter().map(|m| m.player_id).collect();
    assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    assert_eq!(last[0].members[0].points_earned, 2);
}

#[tokio::test]
async fn announcement_defaults_and_updates() {
    let ladder = memory_ladder();
    assert_eq!(ladder.announcement().await.unwrap().title, Announcement::default().title);
    assert!(matches!(
        ladder.update_announcement("Week 3", "", "text", "admin").await,
        Err(LadderError::MissingField("date"))
    ));
    let saved = ladder
        .update_announcement("Week 3", "Oct 22", "Courts 1-4", "admin")
        .await
        .unwrap();
    assert_eq!(saved.updated_by.as_deref(), Some("admin"));
    assert_eq!(ladder.announcement().await.unwrap().content, "Courts 1-4");
}
