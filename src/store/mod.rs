//! Persistence for player and announcement records.
//!
//! The ladder only talks to [`LadderStore`]; records are saved with an
//! optimistic version check so concurrent read-modify-write cycles on the
//! same player cannot both win.

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use crate::models::{Announcement, Player, PlayerId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Player {0} was modified concurrently")]
    Conflict(PlayerId),

    #[error("Player {0} does not exist")]
    Missing(PlayerId),

    #[error("User {0} already has a player profile")]
    DuplicateUser(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait LadderStore: Send + Sync {
    /// Snapshot of every player record.
    async fn players(&self) -> Result<Vec<Player>, StoreError>;

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError>;

    async fn player_by_user(&self, user_id: &str) -> Result<Option<Player>, StoreError>;

    /// Insert a new record. Fails with `DuplicateUser` if the user already has one.
    async fn insert_player(&self, player: Player) -> Result<Player, StoreError>;

    /// Replace a record whose `version` still matches the stored one; returns it with the version bumped.
    async fn save_player(&self, player: Player) -> Result<Player, StoreError>;

    async fn delete_player(&self, id: PlayerId) -> Result<Option<Player>, StoreError>;

    async fn announcement(&self) -> Result<Option<Announcement>, StoreError>;

    async fn save_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError>;
}
