//! Wire protocol shared by the Skyfall server and its clients.
//!
//! Two layers travel over the network:
//! - [`Packet`] is the transport envelope exchanged with the UDP server. It
//!   handles the session lifecycle (connect, heartbeat, disconnect) and
//!   carries opaque game payloads.
//! - [`SocketMessage`] is the game-level message inside a
//!   [`Packet::Message`] payload: client events (join, control change) and
//!   server replies/broadcasts (join reply, error reply, game ping, game over),
//!   plus the leaderboard query and its reply.
//!
//! Both are encoded with [`serialize`] and decoded with [`deserialize`].
//! Decoding never fails loudly: malformed bytes simply decode to `None`.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const WORLD_WIDTH: i32 = 1920;
pub const WORLD_HEIGHT: i32 = 1080;
pub const PLAYER_WIDTH: i32 = 40;
pub const PLAYER_HEIGHT: i32 = 40;

/// Upper bound on a single encoded message. Protects the decoder from
/// length prefixes that would otherwise trigger huge allocations.
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

/// Keys a client can hold down.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerControl {
    Up,
    Down,
    Left,
    Right,
}

/// Public view of a player, as sent in every game ping.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub name: String,
    pub color: String,
    pub x: i32,
    pub y: i32,
    pub score: u32,
}

/// Public view of a platform.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PlatformState {
    pub width: i32,
    pub x: i32,
    pub y: i32,
}

/// One row of the leaderboard: a player's best score.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player: String,
    pub score: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Game-level messages.
///
/// `JoinEvent`, `ControlChangeEvent` and `LeaderboardRequest` flow from
/// client to server, every other variant flows from server to client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    JoinEvent {
        name: String,
    },
    ControlChangeEvent {
        pressed_controls: Vec<PlayerControl>,
    },
    JoinReply {
        server_id: String,
    },
    ErrorReply {
        message: String,
    },
    GamePing {
        server_age: u32,
        players: Vec<PlayerState>,
        platforms: Vec<PlatformState>,
    },
    GameOver {
        reason: String,
    },
    LeaderboardRequest,
    LeaderboardReply {
        entries: Vec<LeaderboardEntry>,
    },
}

impl SocketMessage {
    /// Short name of the variant, used in logs and error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            SocketMessage::JoinEvent { .. } => "JoinEvent",
            SocketMessage::ControlChangeEvent { .. } => "ControlChangeEvent",
            SocketMessage::JoinReply { .. } => "JoinReply",
            SocketMessage::ErrorReply { .. } => "ErrorReply",
            SocketMessage::GamePing { .. } => "GamePing",
            SocketMessage::GameOver { .. } => "GameOver",
            SocketMessage::LeaderboardRequest => "LeaderboardRequest",
            SocketMessage::LeaderboardReply { .. } => "LeaderboardReply",
        }
    }
}

/// Transport envelope for the UDP server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect { client_version: u32 },
    Message { payload: Vec<u8> },
    Heartbeat,
    Disconnect,

    Connected { session_id: String },
    Disconnected { reason: String },
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct WireError(String);

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_BYTES)
}

/// Encodes a message into bytes.
pub fn serialize<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    codec()
        .serialize(message)
        .map_err(|e| WireError(e.to_string()))
}

/// Decodes bytes into a message. Returns `None` for anything malformed,
/// truncated, oversized or followed by trailing bytes.
pub fn deserialize<T: DeserializeOwned>(payload: &[u8]) -> Option<T> {
    codec().deserialize(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample_ping() -> SocketMessage {
        SocketMessage::GamePing {
            server_age: 42,
            players: vec![
                PlayerState {
                    name: "alice".to_string(),
                    color: "#a1b2c3".to_string(),
                    x: 100,
                    y: -20,
                    score: 15,
                },
                PlayerState {
                    name: "bob".to_string(),
                    color: "#000000".to_string(),
                    x: 0,
                    y: 1040,
                    score: 0,
                },
            ],
            platforms: vec![PlatformState {
                width: 300,
                x: 12,
                y: 500,
            }],
        }
    }

    #[test]
    fn test_socket_message_roundtrip() {
        let messages = vec![
            SocketMessage::JoinEvent {
                name: "player one".to_string(),
            },
            SocketMessage::ControlChangeEvent {
                pressed_controls: vec![PlayerControl::Up, PlayerControl::Right],
            },
            SocketMessage::JoinReply {
                server_id: "417".to_string(),
            },
            SocketMessage::ErrorReply {
                message: "Username cannot be blank".to_string(),
            },
            sample_ping(),
            SocketMessage::GameOver {
                reason: "Time limit reached".to_string(),
            },
            SocketMessage::LeaderboardRequest,
            SocketMessage::LeaderboardReply {
                entries: vec![LeaderboardEntry {
                    player: "alice".to_string(),
                    score: 120,
                    timestamp_ms: 1_700_000_000_000,
                }],
            },
        ];

        for message in messages {
            let bytes = serialize(&message).unwrap();
            let decoded: Option<SocketMessage> = deserialize(&bytes);
            assert_eq!(decoded, Some(message));
        }
    }

    #[test]
    fn test_packet_roundtrip_carries_payload() {
        let payload = serialize(&sample_ping()).unwrap();
        let packet = Packet::Message {
            payload: payload.clone(),
        };

        let bytes = serialize(&packet).unwrap();
        match deserialize::<Packet>(&bytes) {
            Some(Packet::Message { payload: inner }) => {
                assert_eq!(inner, payload);
                assert_eq!(deserialize::<SocketMessage>(&inner), Some(sample_ping()));
            }
            other => panic!("Wrong packet after roundtrip: {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_empty_input_is_none() {
        assert_eq!(deserialize::<SocketMessage>(&[]), None);
        assert_eq!(deserialize::<Packet>(&[]), None);
    }

    #[test]
    fn test_deserialize_unknown_variant_is_none() {
        assert_eq!(deserialize::<SocketMessage>(&[42]), None);
        assert_eq!(deserialize::<SocketMessage>(&[0xff; 16]), None);
    }

    #[test]
    fn test_deserialize_truncated_input_is_none() {
        let bytes = serialize(&sample_ping()).unwrap();
        for len in 0..bytes.len() {
            assert_eq!(deserialize::<SocketMessage>(&bytes[..len]), None);
        }
    }

    #[test]
    fn test_deserialize_trailing_bytes_is_none() {
        let mut bytes = serialize(&SocketMessage::JoinEvent {
            name: "x".to_string(),
        })
        .unwrap();
        bytes.push(0);
        assert_eq!(deserialize::<SocketMessage>(&bytes), None);
    }

    #[test]
    fn test_deserialize_random_bytes_never_panics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2000 {
            let len = rng.gen_range(0..64);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let _ = deserialize::<SocketMessage>(&bytes);
            let _ = deserialize::<Packet>(&bytes);
        }
    }

    #[test]
    fn test_oversized_length_prefix_is_none() {
        // JoinEvent tag followed by a u64 length marker claiming ~4 GiB
        let bytes = [0u8, 253, 0, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(deserialize::<SocketMessage>(&bytes), None);
    }

    #[test]
    fn test_message_kind_names() {
        assert_eq!(sample_ping().kind(), "GamePing");
        assert_eq!(
            SocketMessage::JoinEvent {
                name: String::new()
            }
            .kind(),
            "JoinEvent"
        );
    }
}
