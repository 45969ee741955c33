//! Error types for the simulation core.
//!
//! Two families exist. [`ValidationError`] is client-facing: it is turned
//! into an error reply for the originating session and never touches state.
//! [`GameError`] is for contract violations inside the server (bad
//! arguments, lifecycle misuse, broken invariants) and aborts only the
//! offending call.

/// Server-side contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),
    #[error("No player for id: {0}")]
    MissingPlayer(String),
    #[error("The {0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Reasons a client event is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Username cannot be blank")]
    BlankName,
    #[error("Username is too long")]
    NameTooLong,
    #[error("Player limit reached: {0}")]
    PlayerLimit(usize),
    #[error("Client is already playing: {0}")]
    AlreadyPlaying(String),
    #[error("Username already in use: {0}")]
    NameTaken(String),
    #[error("No player exists for client {0}")]
    UnknownClient(String),
    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(&'static str),
    #[error("No platforms to choose from")]
    NoPlatforms,
}
