//! Shared game state.
//!
//! [`GameStore`] is the one aggregate every thread touches: network threads
//! register sessions and apply client updates, the simulation thread
//! advances players and platforms, and the loser worker drains removed
//! players. Each collection is synchronized on its own; a single player is
//! guarded by its own mutex so velocity updates and physics never
//! interleave.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::GameRules;
use crate::platform::Platform;
use crate::player::Player;
use crate::session::Session;

/// Identifies a connected client. Same as its session id.
pub type ClientId = String;

pub type SharedPlayer = Arc<Mutex<Player>>;

/// Callback fired when the first player joins an empty game.
pub type StartAction = Arc<dyn Fn() + Send + Sync>;

pub struct GameStore {
    instance_id: u32,
    rules: GameRules,

    sessions: RwLock<HashMap<ClientId, Arc<Session>>>,
    players: RwLock<HashMap<ClientId, SharedPlayer>>,
    /// Swapped whole once per tick, never edited in place.
    platforms: RwLock<Arc<Vec<Platform>>>,

    tick_count: AtomicU32,
    game_age_seconds: AtomicU32,
    platform_gravity: AtomicI32,

    losers_tx: Sender<Player>,
    losers_rx: Receiver<Player>,

    start_action: Mutex<Option<StartAction>>,
    rng: Mutex<StdRng>,
}

impl GameStore {
    pub fn new(rules: GameRules) -> Self {
        Self::with_rng(rules, StdRng::from_entropy())
    }

    /// A store whose random decisions are reproducible.
    pub fn with_seed(rules: GameRules, seed: u64) -> Self {
        Self::with_rng(rules, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rules: GameRules, mut rng: StdRng) -> Self {
        let instance_id = rng.gen_range(0..999);
        let (losers_tx, losers_rx) = unbounded();
        Self {
            instance_id,
            rules,
            sessions: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            platforms: RwLock::new(Arc::new(Vec::new())),
            tick_count: AtomicU32::new(0),
            game_age_seconds: AtomicU32::new(0),
            platform_gravity: AtomicI32::new(rules.init_platform_gravity),
            losers_tx,
            losers_rx,
            start_action: Mutex::new(None),
            rng: Mutex::new(rng),
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Runs `f` with exclusive access to the store's random source.
    pub fn with_random<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.rng.lock())
    }

    // Sessions

    pub fn add_session(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id().to_string(), session);
    }

    pub fn remove_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Closes every session and forgets them.
    pub fn close_sessions(&self) {
        let drained: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in drained {
            session.close();
        }
    }

    // Players

    /// Inserts `player` under its id. Fires the start event if the game had
    /// no players before.
    pub fn add_player(&self, player: Player) -> SharedPlayer {
        let id = player.id().to_string();
        let shared = Arc::new(Mutex::new(player));
        let was_empty = {
            let mut players = self.players.write();
            let was_empty = players.is_empty();
            if players.insert(id.clone(), Arc::clone(&shared)).is_some() {
                warn!("{} - Replaced existing player for {}", self.instance_id, id);
            }
            was_empty
        };
        if was_empty {
            self.trigger_start_event();
        }
        shared
    }

    /// Removes a player and returns its last state.
    pub fn remove_player(&self, id: &str) -> Option<Player> {
        let removed = self.players.write().remove(id)?;
        let player = removed.lock().clone();
        Some(player)
    }

    pub fn player(&self, id: &str) -> Option<SharedPlayer> {
        self.players.read().get(id).cloned()
    }

    pub fn contains_player(&self, id: &str) -> bool {
        self.players.read().contains_key(id)
    }

    /// Snapshot of the roster. Players can be locked without holding the map.
    pub fn players(&self) -> Vec<(ClientId, SharedPlayer)> {
        self.players
            .read()
            .iter()
            .map(|(id, player)| (id.clone(), Arc::clone(player)))
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }

    pub fn clear_players(&self) {
        self.players.write().clear();
    }

    // Platforms

    pub fn platforms(&self) -> Arc<Vec<Platform>> {
        self.platforms.read().clone()
    }

    pub fn set_platforms(&self, platforms: Vec<Platform>) {
        *self.platforms.write() = Arc::new(platforms);
    }

    // Counters

    pub fn tick_count(&self) -> u32 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn set_tick_count(&self, count: u32) {
        self.tick_count.store(count, Ordering::SeqCst);
    }

    pub fn game_age_seconds(&self) -> u32 {
        self.game_age_seconds.load(Ordering::SeqCst)
    }

    pub fn set_game_age_seconds(&self, age: u32) {
        self.game_age_seconds.store(age, Ordering::SeqCst);
    }

    pub fn platform_gravity(&self) -> i32 {
        self.platform_gravity.load(Ordering::SeqCst)
    }

    pub fn set_platform_gravity(&self, gravity: i32) {
        self.platform_gravity.store(gravity, Ordering::SeqCst);
    }

    /// Back to the values of a fresh game.
    pub fn reset_counters(&self) {
        self.set_tick_count(0);
        self.set_game_age_seconds(0);
        self.set_platform_gravity(self.rules.init_platform_gravity);
    }

    // Losers

    pub fn push_loser(&self, player: Player) {
        debug!("{} - Queued loser {}", self.instance_id, player.name());
        // the store owns the receiver, so the channel can't be disconnected
        let _ = self.losers_tx.send(player);
    }

    pub fn losers(&self) -> &Receiver<Player> {
        &self.losers_rx
    }

    // Start event

    /// Replaces the start event subscriber.
    pub fn on_start_event(&self, action: impl Fn() + Send + Sync + 'static) {
        *self.start_action.lock() = Some(Arc::new(action));
    }

    pub fn trigger_start_event(&self) {
        let action = self.start_action.lock().clone();
        if let Some(action) = action {
            action();
        }
    }
}

impl std::fmt::Debug for GameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStore")
            .field("instance_id", &self.instance_id)
            .field("sessions", &self.session_count())
            .field("players", &self.player_count())
            .field("platforms", &self.platforms().len())
            .field("tick_count", &self.tick_count())
            .field("game_age_seconds", &self.game_age_seconds())
            .field("platform_gravity", &self.platform_gravity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn store() -> GameStore {
        GameStore::with_seed(GameRules::default(), 1)
    }

    fn player(id: &str, name: &str) -> Player {
        Player::new(id, name, "#123456", 0, 0)
    }

    #[test]
    fn test_new_store_defaults() {
        let store = store();
        assert!(store.instance_id() < 999);
        assert_eq!(store.tick_count(), 0);
        assert_eq!(store.game_age_seconds(), 0);
        assert_eq!(store.platform_gravity(), GameRules::default().init_platform_gravity);
        assert_eq!(store.player_count(), 0);
        assert_eq!(store.session_count(), 0);
        assert!(store.platforms().is_empty());
    }

    #[test]
    fn test_seeded_instance_ids_repeat() {
        let a = GameStore::with_seed(GameRules::default(), 77);
        let b = GameStore::with_seed(GameRules::default(), 77);
        assert_eq!(a.instance_id(), b.instance_id());
    }

    #[test]
    fn test_start_event_fires_on_first_player_only() {
        let store = store();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        store.on_start_event(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.add_player(player("a", "alice"));
        store.add_player(player("b", "bob"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        store.clear_players();
        store.add_player(player("c", "carol"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_event_last_subscriber_wins() {
        let store = store();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&first);
        let s = Arc::clone(&second);
        store.on_start_event(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        store.on_start_event(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });

        store.trigger_start_event();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_action_may_read_the_store() {
        let store = Arc::new(store());
        let seen = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&store);
        let seen_clone = Arc::clone(&seen);
        store.on_start_event(move || {
            if let Some(store) = weak.upgrade() {
                seen_clone.store(store.player_count(), Ordering::SeqCst);
            }
        });

        store.add_player(player("a", "alice"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_player_returns_last_state() {
        let store = store();
        let shared = store.add_player(player("a", "alice"));
        shared.lock().add_to_score(15);

        let removed = store.remove_player("a").unwrap();
        assert_eq!(removed.score(), 15);
        assert!(!store.contains_player("a"));
        assert!(store.remove_player("a").is_none());
    }

    #[test]
    fn test_platform_snapshot_survives_replacement() {
        let store = store();
        store.set_platforms(vec![Platform::new(300, 0, 10)]);
        let before = store.platforms();

        store.set_platforms(vec![Platform::new(300, 0, 17), Platform::new(400, 5, 0)]);

        assert_eq!(*before, vec![Platform::new(300, 0, 10)]);
        assert_eq!(store.platforms().len(), 2);
    }

    #[test]
    fn test_reset_counters() {
        let store = store();
        store.set_tick_count(12);
        store.set_game_age_seconds(40);
        store.set_platform_gravity(13);

        store.reset_counters();

        assert_eq!(store.tick_count(), 0);
        assert_eq!(store.game_age_seconds(), 0);
        assert_eq!(store.platform_gravity(), 7);
    }

    #[test]
    fn test_losers_queue_is_fifo() {
        let store = store();
        store.push_loser(player("a", "alice"));
        store.push_loser(player("b", "bob"));

        assert_eq!(store.losers().try_recv().unwrap().name(), "alice");
        assert_eq!(store.losers().try_recv().unwrap().name(), "bob");
        assert!(store.losers().try_recv().is_err());
    }

    #[test]
    fn test_players_snapshot_is_detached() {
        let store = store();
        store.add_player(player("a", "alice"));
        let snapshot = store.players();
        store.clear_players();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.lock().name(), "alice");
        assert_eq!(store.player_count(), 0);
    }
}
