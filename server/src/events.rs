//! Client event processing.
//!
//! [`process_event`] decides what a client event should do to the game
//! without changing anything. Rejections come back as
//! [`GameUpdate::Error`], everything else as an update the caller applies.

use log::error;
use shared::{PlayerControl, SocketMessage};

use crate::config::WORLD_HEIGHT;
use crate::error::{GameError, ValidationError};
use crate::platform::Platform;
use crate::player::{Player, SPAWN_HEIGHT};
use crate::store::GameStore;
use crate::update::GameUpdate;

pub const PLAYER_MOVE_SPEED: i32 = 20;
pub const PLAYER_JUMP_SPEED: i32 = 40;
pub const MAX_PLAYER_COUNT: usize = 15;
/// In characters.
pub const MAX_NAME_LENGTH: usize = 25;
pub const INIT_PLATFORM_SPACING: i32 = 175;

/// Works out the update for one event from `client`. The store is only read.
pub fn process_event(client: &str, event: &SocketMessage, store: &GameStore) -> GameUpdate {
    let result = match event {
        SocketMessage::JoinEvent { name } => process_join(client, name, store),
        SocketMessage::ControlChangeEvent { pressed_controls } => {
            process_control_change(client, pressed_controls, store)
        }
        other => Err(ValidationError::UnsupportedEvent(other.kind())),
    };
    result.unwrap_or_else(GameUpdate::from)
}

/// New velocity for the client's player from the keys it holds.
///
/// Right wins over left. A jump is only granted while the player is not
/// falling faster than twice the platform gravity, which is loose enough to
/// allow the odd mid-air jump. Releasing up while rising cuts the jump.
pub fn process_control_change(
    client: &str,
    pressed: &[PlayerControl],
    store: &GameStore,
) -> Result<GameUpdate, ValidationError> {
    let player = store
        .player(client)
        .ok_or_else(|| ValidationError::UnknownClient(client.to_string()))?;
    let old_y_velocity = player.lock().y_velocity();

    let x_velocity = if pressed.contains(&PlayerControl::Right) {
        PLAYER_MOVE_SPEED
    } else if pressed.contains(&PlayerControl::Left) {
        -PLAYER_MOVE_SPEED
    } else {
        0
    };

    let pressing_up = pressed.contains(&PlayerControl::Up);
    let can_jump = 0 <= old_y_velocity && old_y_velocity < 2 * store.platform_gravity();
    let y_velocity = if pressing_up && can_jump {
        -PLAYER_JUMP_SPEED
    } else if !pressing_up && old_y_velocity < 0 {
        0
    } else {
        old_y_velocity
    };

    Ok(GameUpdate::UpdateVelocity {
        client: client.to_string(),
        x_velocity,
        y_velocity,
    })
}

/// Validates a join and builds the new player above a platform.
pub fn process_join(client: &str, name: &str, store: &GameStore) -> Result<GameUpdate, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::BlankName);
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }

    let players = store.players();
    if players.len() >= MAX_PLAYER_COUNT {
        return Err(ValidationError::PlayerLimit(players.len()));
    }
    if players.iter().any(|(id, _)| id == client) {
        return Err(ValidationError::AlreadyPlaying(client.to_string()));
    }
    let lowered = name.to_lowercase();
    if players
        .iter()
        .any(|(_, player)| player.lock().name().to_lowercase() == lowered)
    {
        return Err(ValidationError::NameTaken(name.to_string()));
    }

    let current = store.platforms();
    let platforms = if current.is_empty() {
        store
            .with_random(|rng| spawn_init_platforms(rng))
            .map_err(|e| {
                error!("Failed to build starting platforms: {}", e);
                ValidationError::NoPlatforms
            })?
    } else {
        current.to_vec()
    };
    let spawn = choose_spawn_platform(&platforms).ok_or(ValidationError::NoPlatforms)?;
    let player = store.with_random(|rng| Player::create_above_platform(client, name, &spawn, rng));
    let server_id = store.instance_id().to_string();

    if players.is_empty() {
        Ok(GameUpdate::CreateFirstPlayer {
            player,
            platforms,
            server_id,
        })
    } else {
        Ok(GameUpdate::CreatePlayer { player, server_id })
    }
}

/// Platforms every [`INIT_PLATFORM_SPACING`] pixels from the top of the
/// world down.
pub fn spawn_init_platforms<R: rand::Rng + ?Sized>(rng: &mut R) -> Result<Vec<Platform>, GameError> {
    (0..WORLD_HEIGHT)
        .step_by(INIT_PLATFORM_SPACING as usize)
        .map(|height| Platform::generate_at_height(height, &mut *rng))
        .collect()
}

/// The highest platform that still leaves [`SPAWN_HEIGHT`] of room above
/// it. Falls back to the lowest platform when none does.
pub fn choose_spawn_platform(platforms: &[Platform]) -> Option<Platform> {
    platforms
        .iter()
        .filter(|p| p.y >= SPAWN_HEIGHT)
        .min_by_key(|p| p.y)
        .or_else(|| platforms.iter().max_by_key(|p| p.y))
        .copied()
}
