//! Integration tests for the point table and penalties.

use doubles_ladder::logic::points::{
    is_scored, penalty, points, scored_group_sizes, NO_SHOW_PENALTY,
};
use doubles_ladder::Scenario;

#[test]
fn table_values() {
    assert_eq!(points(1, 4), 2);
    assert_eq!(points(2, 4), 1);
    assert_eq!(points(4, 4), -1);
    assert_eq!(points(4, 5), 0);
    assert_eq!(points(5, 5), -1);
    assert_eq!(points(2, 3), 0);
    assert_eq!(points(3, 3), -1);
}

#[test]
fn first_place_always_two_and_last_place_most_negative() {
    for size in scored_group_sizes() {
        assert_eq!(points(1, size), 2);
        let last = points(size, size);
        for pos in 1..size {
            assert!(points(pos, size) > last, "size {size} pos {pos}");
            if pos > 1 {
                assert!(points(pos, size) >= 0);
            }
        }
    }
}

#[test]
fn pairs_outside_table_yield_zero_and_are_not_scored() {
    for (pos, size) in [(0, 4), (5, 4), (1, 1), (1, 2), (2, 2), (1, 6), (6, 6)] {
        assert_eq!(points(pos, size), 0);
        assert!(!is_scored(pos, size), "({pos}, {size})");
    }
    assert!(is_scored(5, 5));
}

#[test]
fn penalties_only_for_non_participation() {
    assert_eq!(penalty(Scenario::NoShow), Some(NO_SHOW_PENALTY));
    assert_eq!(penalty(Scenario::NoShow), Some(-2));
    assert_eq!(penalty(Scenario::NoResult), Some(-1));
    assert_eq!(penalty(Scenario::NotPlaying), Some(-1));
    assert_eq!(penalty(Scenario::Played), None);
    assert_eq!(penalty(Scenario::AdminAdjustment), None);
}
