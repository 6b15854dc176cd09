//! Integration tests for week rotation.

use chrono::{DateTime, TimeZone, Utc};
use doubles_ladder::logic::{
    rotate, rotate_player, submit, Assignment, RotationOutcome, Submission, SubmissionMode,
};
use doubles_ladder::models::CurrentWeek;
use doubles_ladder::Player;
use pretty_assertions::assert_eq;

fn marker(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, 1, 1, 0).unwrap()
}

fn assignment(group_number: u32, position_in_group: u32) -> Option<Assignment> {
    Some(Assignment {
        group_number,
        position_in_group,
    })
}

/// Player who played cycle `day` in group 2, seeded 3rd, and finished 2nd of 4.
fn played_player(day: u32) -> Player {
    let mut p = Player::new("u1", "Ana");
    p.current_week = CurrentWeek::assigned(2, 3, marker(day));
    let submission = Submission {
        position: 2,
        group_size: 4,
        actual_group_size: 4,
        mode: SubmissionMode::SelfService,
    };
    submit(&mut p, submission, marker(day)).unwrap();
    p
}

#[test]
fn archives_and_installs_new_assignment() {
    let mut p = played_player(9);
    let outcome = rotate_player(&mut p, assignment(1, 4), marker(16));
    assert_eq!(outcome, RotationOutcome::Rotated);

    assert_eq!(p.last_week.group_number, Some(2));
    assert_eq!(p.last_week.position_in_group, Some(3));
    assert_eq!(p.last_week.final_position, Some(2));
    assert_eq!(p.last_week.points_earned, 1);
    assert!(p.last_week.has_submitted);

    assert_eq!(p.current_week, CurrentWeek::assigned(1, 4, marker(16)));
    assert!(!p.current_week.has_submitted);
    assert_eq!(p.current_week.final_position, None);
    assert_eq!(p.current_week.points_earned_this_cycle, 0);
}

#[test]
fn unsubmitted_week_archives_seeded_position() {
    let mut p = Player::new("u1", "Ana");
    p.current_week = CurrentWeek::assigned(3, 2, marker(9));
    rotate_player(&mut p, None, marker(16));
    assert_eq!(p.last_week.final_position, Some(2));
    assert_eq!(p.last_week.points_earned, 0);
    assert!(!p.current_week.is_assigned());
}

#[test]
fn unassigned_player_keeps_previous_archive() {
    let mut p = played_player(2);
    rotate_player(&mut p, None, marker(9));
    let archived = p.last_week.clone();
    rotate_player(&mut p, None, marker(16));
    assert_eq!(p.last_week, archived);
    assert_eq!(p.current_week, CurrentWeek::default());
}

#[test]
fn retry_with_same_marker_is_a_no_op() {
    let mut p = played_player(9);
    rotate_player(&mut p, assignment(1, 1), marker(16));
    let after_first = p.clone();

    let outcome = rotate_player(&mut p, assignment(1, 1), marker(16));
    assert_eq!(outcome, RotationOutcome::AlreadyRotated);
    assert_eq!(p, after_first);
    assert_eq!(p.last_week.final_position, Some(2));
}

#[test]
fn rotate_all_reports_per_player_outcome() {
    let mut players = vec![played_player(9), Player::new("u2", "Ben"), Player::new("u3", "Cy")];
    let groups = vec![vec![players[1].id, players[0].id]];
    let outcomes = rotate(&mut players, &groups, marker(16));
    assert!(outcomes.iter().all(|(_, o)| *o == RotationOutcome::Rotated));

    assert_eq!(players[1].current_week.position_in_group, Some(1));
    assert_eq!(players[0].current_week.position_in_group, Some(2));
    assert_eq!(players[0].current_week.group_number, Some(1));
    assert!(!players[2].current_week.is_assigned());

    let again = rotate(&mut players, &groups, marker(16));
    // Unassigned players have no marker to compare against and rotate to the same empty week.
    assert_eq!(again[0].1, RotationOutcome::AlreadyRotated);
    assert_eq!(again[1].1, RotationOutcome::AlreadyRotated);
    assert_eq!(players[0].last_week.final_position, Some(2));
}
