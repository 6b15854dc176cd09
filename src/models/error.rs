//! Errors returned by ladder operations.

use crate::models::player::PlayerId;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// One player whose update failed inside a batch or rotation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PlayerFailure {
    pub player_id: PlayerId,
    pub reason: String,
}

impl PlayerFailure {
    pub fn new(player_id: PlayerId, error: &LadderError) -> Self {
        Self {
            player_id,
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("Need at least 2 active players to form groups (found {found})")]
    InsufficientPlayers { found: usize },

    #[error("Group size must be at least 2 (got {0})")]
    InvalidGroupSize(usize),

    #[error("Player is not in a group this week")]
    NotInGroup,

    #[error("Ranking already submitted for this week")]
    AlreadySubmitted,

    #[error("Invalid position {position} for a group of {group_size}")]
    InvalidPosition { position: u32, group_size: u32 },

    #[error("Positions must be exactly 1..={group_size}, one per group member")]
    InvalidPermutation { group_size: u32 },

    #[error("Group formation already in progress")]
    FormationInProgress,

    #[error("Ranking submission is not available at this time")]
    SubmissionWindowClosed,

    #[error("Player not found")]
    PlayerNotFound(PlayerId),

    #[error("Group {0} not found this week")]
    GroupNotFound(u32),

    #[error("This user already has a player profile")]
    DuplicatePlayer,

    #[error("Player name must not be empty")]
    InvalidName,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{} player update(s) failed, {applied} applied", .failures.len())]
    PartialFailure {
        applied: usize,
        failures: Vec<PlayerFailure>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LadderError {
    /// Domain precondition failures, as opposed to infrastructure or partial results.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LadderError::Store(_) | LadderError::PartialFailure { .. })
    }
}
