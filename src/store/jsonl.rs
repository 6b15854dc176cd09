//! File-backed store: one JSON player per line plus a JSON announcement.
//!
//! The whole file is rewritten after every mutation (write to a temp file,
//! then rename), so a crash never leaves a half-written `players.jsonl`.

use super::memory::{insert_into, save_into};
use super::{LadderStore, StoreError};
use crate::models::{Announcement, Player, PlayerId};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const PLAYERS_FILE: &str = "players.jsonl";
const ANNOUNCEMENT_FILE: &str = "announcement.json";

#[derive(Debug, Default)]
struct Records {
    players: HashMap<PlayerId, Player>,
    announcement: Option<Announcement>,
}

#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    records: Mutex<Records>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `dir`, loading any existing records.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let players = read_players(&dir.join(PLAYERS_FILE))?;
        let announcement_path = dir.join(ANNOUNCEMENT_FILE);
        let announcement = if announcement_path.exists() {
            Some(serde_json::from_reader(BufReader::new(File::open(&announcement_path)?))?)
        } else {
            None
        };
        info!("Loaded {} player(s) from {:?}", players.len(), dir);
        Ok(Self {
            dir,
            records: Mutex::new(Records {
                players: players.into_iter().map(|p| (p.id, p)).collect(),
                announcement,
            }),
        })
    }

    fn flush_players(&self, players: &HashMap<PlayerId, Player>) -> Result<(), StoreError> {
        let mut sorted: Vec<&Player> = players.values().collect();
        sorted.sort_by_key(|p| (p.created_at, p.id));
        let path = self.dir.join(PLAYERS_FILE);
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for p in sorted {
                writeln!(writer, "{}", serde_json::to_string(p)?)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} player(s) to {:?}", players.len(), path);
        Ok(())
    }

    fn flush_announcement(&self, announcement: &Announcement) -> Result<(), StoreError> {
        let path = self.dir.join(ANNOUNCEMENT_FILE);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, announcement)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Read every player line; malformed lines are skipped with a warning.
fn read_players(path: &Path) -> Result<Vec<Player>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut players = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(p) => players.push(p),
            Err(e) => warn!("Skipping malformed player at {:?}:{}: {}", path, i + 1, e),
        }
    }
    Ok(players)
}

#[async_trait]
impl LadderStore for JsonlStore {
    async fn players(&self) -> Result<Vec<Player>, StoreError> {
        let records = self.records.lock().await;
        let mut players: Vec<Player> = records.players.values().cloned().collect();
        players.sort_by_key(|p| (p.created_at, p.id));
        Ok(players)
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self.records.lock().await.players.get(&id).cloned())
    }

    async fn player_by_user(&self, user_id: &str) -> Result<Option<Player>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .players
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_player(&self, player: Player) -> Result<Player, StoreError> {
        let mut records = self.records.lock().await;
        let inserted = insert_into(&mut records.players, player)?;
        if let Err(e) = self.flush_players(&records.players) {
            records.players.remove(&inserted.id);
            return Err(e);
        }
        Ok(inserted)
    }

    async fn save_player(&self, player: Player) -> Result<Player, StoreError> {
        let mut records = self.records.lock().await;
        let previous = records.players.get(&player.id).cloned();
        let saved = save_into(&mut records.players, player)?;
        if let Err(e) = self.flush_players(&records.players) {
            if let Some(previous) = previous {
                records.players.insert(previous.id, previous);
            }
            return Err(e);
        }
        Ok(saved)
    }

    async fn delete_player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        let mut records = self.records.lock().await;
        let removed = records.players.remove(&id);
        if let Some(p) = &removed {
            if let Err(e) = self.flush_players(&records.players) {
                records.players.insert(id, p.clone());
                return Err(e);
            }
        }
        Ok(removed)
    }

    async fn announcement(&self) -> Result<Option<Announcement>, StoreError> {
        Ok(self.records.lock().await.announcement.clone())
    }

    async fn save_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError> {
        let mut records = self.records.lock().await;
        self.flush_announcement(&announcement)?;
        records.announcement = Some(announcement.clone());
        Ok(announcement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_players_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlStore::open(temp_dir.path()).unwrap();
        let alice = store.insert_player(Player::new("u1", "Alice")).await.unwrap();
        let mut bob = store.insert_player(Player::new("u2", "Bob")).await.unwrap();
        bob.lifetime_points = 7;
        store.save_player(bob.clone()).await.unwrap();

        let reopened = JsonlStore::open(temp_dir.path()).unwrap();
        let players = reopened.players().await.unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(reopened.player(alice.id).await.unwrap().unwrap().name, "Alice");
        let bob = reopened.player(bob.id).await.unwrap().unwrap();
        assert_eq!(bob.lifetime_points, 7);
        assert_eq!(bob.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlStore::open(temp_dir.path()).unwrap();
        let p = store.insert_player(Player::new("u1", "Alice")).await.unwrap();
        store.save_player(p.clone()).await.unwrap();
        assert!(matches!(
            store.save_player(p).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_user_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlStore::open(temp_dir.path()).unwrap();
        store.insert_player(Player::new("u1", "Alice")).await.unwrap();
        assert!(matches!(
            store.insert_player(Player::new("u1", "Alice again")).await,
            Err(StoreError::DuplicateUser(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = JsonlStore::open(temp_dir.path()).unwrap();
            store.insert_player(Player::new("u1", "Alice")).await.unwrap();
        }
        let path = temp_dir.path().join(PLAYERS_FILE);
        let mut contents = fs::read_to_string(&path).unwrap();
        contents.push_str("{not json}\n");
        fs::write(&path, contents).unwrap();

        let store = JsonlStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.players().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_announcement_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlStore::open(temp_dir.path()).unwrap();
        assert!(store.announcement().await.unwrap().is_none());
        let a = Announcement {
            title: "Ladder".to_string(),
            ..Announcement::default()
        };
        store.save_announcement(a.clone()).await.unwrap();
        let reopened = JsonlStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.announcement().await.unwrap(), Some(a));
    }
}
