//! In-memory store. Default when no data directory is configured; also used by tests.

use super::{LadderStore, StoreError};
use crate::models::{Announcement, Player, PlayerId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    players: RwLock<HashMap<PlayerId, Player>>,
    announcement: RwLock<Option<Announcement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert into a player map, enforcing one record per user.
pub(super) fn insert_into(
    map: &mut HashMap<PlayerId, Player>,
    player: Player,
) -> Result<Player, StoreError> {
    if map.values().any(|p| p.user_id == player.user_id) {
        return Err(StoreError::DuplicateUser(player.user_id));
    }
    map.insert(player.id, player.clone());
    Ok(player)
}

/// Replace a record in a player map after the version check.
pub(super) fn save_into(
    map: &mut HashMap<PlayerId, Player>,
    mut player: Player,
) -> Result<Player, StoreError> {
    let stored = map.get(&player.id).ok_or(StoreError::Missing(player.id))?;
    if stored.version != player.version {
        return Err(StoreError::Conflict(player.id));
    }
    player.version += 1;
    player.updated_at = Utc::now();
    map.insert(player.id, player.clone());
    Ok(player)
}

#[async_trait]
impl LadderStore for MemoryStore {
    async fn players(&self) -> Result<Vec<Player>, StoreError> {
        let mut players: Vec<Player> = self.players.read().await.values().cloned().collect();
        players.sort_by_key(|p| (p.created_at, p.id));
        Ok(players)
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self.players.read().await.get(&id).cloned())
    }

    async fn player_by_user(&self, user_id: &str) -> Result<Option<Player>, StoreError> {
        Ok(self
            .players
            .read()
            .await
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_player(&self, player: Player) -> Result<Player, StoreError> {
        insert_into(&mut *self.players.write().await, player)
    }

    async fn save_player(&self, player: Player) -> Result<Player, StoreError> {
        save_into(&mut *self.players.write().await, player)
    }

    async fn delete_player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self.players.write().await.remove(&id))
    }

    async fn announcement(&self) -> Result<Option<Announcement>, StoreError> {
        Ok(self.announcement.read().await.clone())
    }

    async fn save_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError> {
        *self.announcement.write().await = Some(announcement.clone());
        Ok(announcement)
    }
}
