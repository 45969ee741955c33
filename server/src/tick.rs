//! One step of the simulation.
//!
//! [`advance_to_next_tick`] moves the clock, the platforms and the players
//! forward by one tick and reports what the loop has to do next. Spawning
//! new platforms is a separate policy, see [`should_spawn_platform`].

use log::info;
use rand::Rng;
use shared::SocketMessage;

use crate::config::WORLD_HEIGHT;
use crate::platform::Platform;
use crate::player::MAX_PLAYER_Y;
use crate::store::{ClientId, GameStore};

/// Never spawn while the topmost platform is closer to the top than this.
pub const MIN_PLATFORM_SPACING: i32 = 100;
/// Always spawn once the topmost platform is further down than this.
pub const MAX_PLATFORM_SPACING: i32 = 350;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickResponse {
    /// Always true for now; every tick is broadcast.
    pub update_needed: bool,
    pub next_platforms: Vec<Platform>,
    /// Players that reached the floor.
    pub players_to_remove: Vec<ClientId>,
}

/// Advances the store by one tick.
///
/// Updates the tick counter, game age and platform gravity in the store,
/// and moves every player against the platforms' next positions. The
/// platforms themselves are returned, not stored.
pub fn advance_to_next_tick(store: &GameStore) -> TickResponse {
    let rules = store.rules();
    let next_tick = (store.tick_count() + 1) % rules.ticks_per_second.max(1);
    store.set_tick_count(next_tick);
    let new_second = next_tick == 0;
    if new_second {
        add_one_second(store);
    }

    let gravity = store.platform_gravity();
    let next_platforms: Vec<Platform> = store
        .platforms()
        .iter()
        .map(|platform| platform.advance(gravity))
        .filter(|platform| platform.y <= WORLD_HEIGHT)
        .collect();

    let mut players_to_remove = Vec::new();
    for (id, shared) in store.players() {
        let mut player = shared.lock();
        player.advance(&next_platforms, gravity);
        player.clear_changed();
        if player.y() >= MAX_PLAYER_Y {
            players_to_remove.push(id);
        } else if new_second {
            player.add_to_score(rules.score_per_second);
        }
    }

    TickResponse {
        update_needed: true,
        next_platforms,
        players_to_remove,
    }
}

fn add_one_second(store: &GameStore) {
    let rules = store.rules();
    let age = store.game_age_seconds() + 1;
    store.set_game_age_seconds(age);
    if age % rules.platform_speedup_interval.max(1) == 0 {
        let gravity = store.platform_gravity() + rules.levelup_platform_gravity;
        info!(
            "{} - Advancing to next level (gravity {})",
            store.instance_id(),
            gravity
        );
        store.set_platform_gravity(gravity);
    }
}

/// Decides whether a new platform should appear at the top this tick.
///
/// Deterministic when the topmost platform is very close to or very far
/// from the top, otherwise a coin flip with odds `1 / (ticks_per_second / 2)`.
pub fn should_spawn_platform<R: Rng + ?Sized>(
    platforms: &[Platform],
    rng: &mut R,
    ticks_per_second: u32,
) -> bool {
    let smallest_y = platforms.iter().map(|p| p.y).min().unwrap_or(0);
    if smallest_y < MIN_PLATFORM_SPACING {
        return false;
    }
    if smallest_y > MAX_PLATFORM_SPACING {
        return true;
    }
    let odds = (ticks_per_second / 2).max(1);
    rng.gen_range(0..odds) == 0
}

/// Snapshot of the game for broadcasting.
pub fn create_game_ping(store: &GameStore) -> SocketMessage {
    let players = store
        .players()
        .iter()
        .map(|(_, player)| player.lock().to_state())
        .collect();
    let platforms = store.platforms().iter().map(Platform::to_state).collect();
    SocketMessage::GamePing {
        server_age: store.game_age_seconds(),
        players,
        platforms,
    }
}
