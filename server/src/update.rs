//! State transitions produced by client events.
//!
//! [`crate::events::process_event`] never touches the store. It returns a
//! [`GameUpdate`] describing what should happen, and the caller applies it
//! with [`GameUpdate::apply_to`] and sends [`GameUpdate::reply`] back to the
//! client.

use log::error;
use shared::SocketMessage;

use crate::error::{GameError, ValidationError};
use crate::platform::Platform;
use crate::player::Player;
use crate::store::{ClientId, GameStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameUpdate {
    /// First player of a game, together with the platforms it starts on.
    CreateFirstPlayer {
        player: Player,
        platforms: Vec<Platform>,
        server_id: String,
    },
    CreatePlayer {
        player: Player,
        server_id: String,
    },
    UpdateVelocity {
        client: ClientId,
        x_velocity: i32,
        y_velocity: i32,
    },
    Error {
        message: String,
    },
}

impl GameUpdate {
    /// Encoded message for the client that caused the update, if any.
    pub fn reply(&self) -> Option<Vec<u8>> {
        let message = match self {
            GameUpdate::CreateFirstPlayer { server_id, .. }
            | GameUpdate::CreatePlayer { server_id, .. } => SocketMessage::JoinReply {
                server_id: server_id.clone(),
            },
            GameUpdate::Error { message } => SocketMessage::ErrorReply {
                message: message.clone(),
            },
            GameUpdate::UpdateVelocity { .. } => return None,
        };
        match shared::serialize(&message) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Failed to encode {}: {}", message.kind(), e);
                None
            }
        }
    }

    /// Applies the update. Only a velocity update for a client without a
    /// player can fail.
    pub fn apply_to(&self, store: &GameStore) -> Result<(), GameError> {
        match self {
            GameUpdate::CreateFirstPlayer {
                player, platforms, ..
            } => {
                // platforms first: adding the player may start the loop
                store.set_platforms(platforms.clone());
                store.add_player(player.clone());
            }
            GameUpdate::CreatePlayer { player, .. } => {
                store.add_player(player.clone());
            }
            GameUpdate::UpdateVelocity {
                client,
                x_velocity,
                y_velocity,
            } => {
                let player = store
                    .player(client)
                    .ok_or_else(|| GameError::MissingPlayer(client.clone()))?;
                player.lock().set_velocity(*x_velocity, *y_velocity);
            }
            GameUpdate::Error { .. } => {}
        }
        Ok(())
    }
}

impl From<ValidationError> for GameUpdate {
    fn from(error: ValidationError) -> Self {
        GameUpdate::Error {
            message: error.to_string(),
        }
    }
}
