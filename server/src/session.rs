//! Client sessions and the callbacks a transport drives.
//!
//! A transport (the UDP server in [`crate::network`], or a mock in tests)
//! wraps each connection in a [`Session`] and reports connects, disconnects
//! and binary messages to a [`ConnectionHandler`]. None of the handler's
//! callbacks panic on bad client input.

use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::SocketMessage;
use std::io;
use std::sync::Arc;

use crate::error::GameError;
use crate::events::process_event;
use crate::leaderboard::{Leaderboard, LEADERBOARD_SIZE};
use crate::store::GameStore;

/// One client connection as seen by the simulation.
pub trait Transport: Send + Sync {
    fn id(&self) -> &str;
    fn is_open(&self) -> bool;
    fn send(&self, bytes: &[u8]) -> io::Result<()>;
    fn close(&self);
}

/// A transport plus the lock that serializes writes to it.
pub struct Session {
    transport: Box<dyn Transport>,
    write_lock: Mutex<()>,
}

impl Session {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            write_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        self.transport.id()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Sends `bytes` unless the session is closed. Returns whether anything
    /// was sent.
    pub fn send_if_open(&self, bytes: &[u8]) -> io::Result<bool> {
        let _guard = self.write_lock.lock();
        if !self.transport.is_open() {
            return Ok(false);
        }
        self.transport.send(bytes)?;
        Ok(true)
    }

    pub fn close(&self) {
        let _guard = self.write_lock.lock();
        self.transport.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Connects transport events to the game.
#[derive(Clone)]
pub struct ConnectionHandler {
    store: Arc<GameStore>,
    leaderboard: Arc<dyn Leaderboard>,
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandler {
    pub fn new(store: Arc<GameStore>, leaderboard: Arc<dyn Leaderboard>) -> Self {
        Self { store, leaderboard }
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.store
    }

    pub fn on_connect(&self, session: Arc<Session>) {
        info!(
            "{} - New connection: {}",
            self.store.instance_id(),
            session.id()
        );
        self.store.add_session(session);
    }

    /// Forgets the session. Its player, if it had one, becomes a loser.
    pub fn on_disconnect(&self, session_id: &str) {
        match self.store.remove_player(session_id) {
            Some(player) => self.store.push_loser(player),
            None => debug!(
                "{} - No player was saved for session {}",
                self.store.instance_id(),
                session_id
            ),
        }
        self.store.remove_session(session_id);
        info!(
            "{} - Player left (total {})",
            self.store.instance_id(),
            self.store.player_count()
        );
    }

    /// Decodes one client event, applies it and replies to the sender.
    ///
    /// Undecodable payloads are logged and dropped. An error is returned
    /// only when applying the update breaks a store invariant.
    pub fn on_binary_message(&self, session_id: &str, bytes: &[u8]) -> Result<(), GameError> {
        let Some(message) = shared::deserialize::<SocketMessage>(bytes) else {
            warn!(
                "{} - Invalid message of {} bytes from {}",
                self.store.instance_id(),
                bytes.len(),
                session_id
            );
            return Ok(());
        };

        if message == SocketMessage::LeaderboardRequest {
            self.reply_with_leaderboard(session_id);
            return Ok(());
        }

        let update = process_event(session_id, &message, &self.store);
        update.apply_to(&self.store)?;

        if let Some(reply) = update.reply() {
            self.reply(session_id, &reply);
        }
        Ok(())
    }

    /// Answers with the best [`LEADERBOARD_SIZE`] entries, or an error reply
    /// when the leaderboard cannot be read.
    fn reply_with_leaderboard(&self, session_id: &str) {
        let message = match self.leaderboard.top(LEADERBOARD_SIZE) {
            Ok(entries) => SocketMessage::LeaderboardReply { entries },
            Err(e) => {
                warn!("{} - {}", self.store.instance_id(), e);
                SocketMessage::ErrorReply {
                    message: e.to_string(),
                }
            }
        };
        match shared::serialize(&message) {
            Ok(bytes) => self.reply(session_id, &bytes),
            Err(e) => warn!("Failed to encode {}: {}", message.kind(), e),
        }
    }

    fn reply(&self, session_id: &str, bytes: &[u8]) {
        match self.store.session(session_id) {
            Some(session) => {
                if let Err(e) = session.send_if_open(bytes) {
                    warn!("Failed to reply to {}: {}", session_id, e);
                }
            }
            None => debug!("Dropping reply for unknown session {}", session_id),
        }
    }
}
