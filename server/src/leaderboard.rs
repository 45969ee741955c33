//! Persistence of finished players' scores.
//!
//! The loser worker in [`crate::game_loop`] records every player removed
//! from a game through the [`Leaderboard`] trait. Implementations may be
//! slow or unavailable; errors are logged by the worker and never reach
//! the tick thread. Clients read the board with a
//! [`shared::SocketMessage::LeaderboardRequest`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::player::Player;

pub use shared::LeaderboardEntry;

/// Rows sent in a leaderboard reply.
pub const LEADERBOARD_SIZE: usize = 10;

/// Entry for a player that just left the game, stamped with the current
/// time.
pub fn entry_for(player: &Player) -> LeaderboardEntry {
    LeaderboardEntry {
        player: player.name().to_string(),
        score: player.score(),
        timestamp_ms: now_millis(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("Leaderboard unavailable: {0}")]
    Unavailable(String),
}

pub trait Leaderboard: Send + Sync {
    /// Saves `entry` if it beats the player's previous best.
    fn record(&self, entry: LeaderboardEntry) -> Result<(), LeaderboardError>;

    /// Best entries, highest score first.
    fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, LeaderboardError>;
}

/// Accepts everything and remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLeaderboard;

impl Leaderboard for NoopLeaderboard {
    fn record(&self, _entry: LeaderboardEntry) -> Result<(), LeaderboardError> {
        Ok(())
    }

    fn top(&self, _limit: usize) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        Ok(Vec::new())
    }
}

/// Keeps each player's best entry in memory.
#[derive(Debug, Default)]
pub struct InMemoryLeaderboard {
    entries: Mutex<HashMap<String, LeaderboardEntry>>,
}

impl InMemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Leaderboard for InMemoryLeaderboard {
    fn record(&self, entry: LeaderboardEntry) -> Result<(), LeaderboardError> {
        let mut entries = self.entries.lock();
        match entries.get(&entry.player) {
            Some(existing) if existing.score >= entry.score => {}
            _ => {
                entries.insert(entry.player.clone(), entry);
            }
        }
        Ok(())
    }

    fn top(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.timestamp_ms.cmp(&b.timestamp_ms))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(player: &str, score: u32, timestamp_ms: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            player: player.to_string(),
            score,
            timestamp_ms,
        }
    }

    #[test]
    fn test_keeps_higher_score() {
        let board = InMemoryLeaderboard::new();
        board.record(entry("alice", 10, 1)).unwrap();
        board.record(entry("alice", 5, 2)).unwrap();
        assert_eq!(board.top(10).unwrap(), vec![entry("alice", 10, 1)]);

        board.record(entry("alice", 30, 3)).unwrap();
        assert_eq!(board.top(10).unwrap(), vec![entry("alice", 30, 3)]);
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_equal_score_keeps_first_entry() {
        let board = InMemoryLeaderboard::new();
        board.record(entry("bob", 10, 1)).unwrap();
        board.record(entry("bob", 10, 9)).unwrap();
        assert_eq!(board.top(1).unwrap()[0].timestamp_ms, 1);
    }

    #[test]
    fn test_top_sorted_and_limited() {
        let board = InMemoryLeaderboard::new();
        board.record(entry("a", 5, 1)).unwrap();
        board.record(entry("b", 50, 2)).unwrap();
        board.record(entry("c", 20, 3)).unwrap();
        board.record(entry("d", 20, 0)).unwrap();

        let top: Vec<_> = board
            .top(3)
            .unwrap()
            .into_iter()
            .map(|e| e.player)
            .collect();
        assert_eq!(top, vec!["b", "d", "c"]);
        assert!(board.top(0).unwrap().is_empty());
    }

    #[test]
    fn test_noop_leaderboard() {
        let board = NoopLeaderboard;
        board.record(entry("a", 1, 1)).unwrap();
        assert!(board.top(10).unwrap().is_empty());
    }

    #[test]
    fn test_entry_from_player() {
        let mut player = Player::new("c1", "alice", "#000000", 0, 0);
        player.add_to_score(25);
        let before = now_millis();

        let entry = entry_for(&player);

        assert_eq!(entry.player, "alice");
        assert_eq!(entry.score, 25);
        assert!(entry.timestamp_ms >= before);
    }
}
