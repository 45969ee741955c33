//! # Skyfall Game Server
//!
//! Authoritative server for Skyfall, a multiplayer platformer in which
//! platforms keep falling and players jump between them for as long as they
//! can. The last one standing scores highest.
//!
//! ## Simulation core
//!
//! - [`platform`] and [`player`]: the two entities and their per-tick motion.
//! - [`store`]: the shared game state every thread works on.
//! - [`events`] and [`update`]: client events become [`update::GameUpdate`]s,
//!   which are the only way clients change the game.
//! - [`tick`]: one step of the simulation.
//! - [`game_loop`]: the threads that run a game, record losers and shut an
//!   idle server down.
//!
//! ## Around the core
//!
//! - [`session`]: the callbacks a transport drives, and the [`session::Transport`]
//!   trait it implements.
//! - [`network`] and [`client_manager`]: the UDP transport.
//! - [`leaderboard`]: where finished players' scores go.
//! - [`config`], [`error`] and [`cancel`]: constants and command line, error
//!   types, thread cancellation.
//!
//! ## Threads
//!
//! Network I/O runs on tokio. A running game has one simulation thread and
//! one loser worker, both plain OS threads; an idle server has at most one
//! timer thread. Players are locked one at a time, and the platform list is
//! replaced whole once per tick, so readers never see a half-applied change.

pub mod cancel;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod events;
pub mod game_loop;
pub mod leaderboard;
pub mod network;
pub mod platform;
pub mod player;
pub mod session;
pub mod store;
pub mod tick;
pub mod update;
