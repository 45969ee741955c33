//! Game constants and runtime configuration.
//!
//! The geometry of the world lives in `shared`. Everything else that shapes
//! a game (gravity, level-up cadence, tick pacing, idle shutdown) is either a
//! constant here or a field of [`GameRules`] / [`LoopSettings`], both of
//! which are produced from the command line by [`Config`].

use clap::Parser;
use std::time::Duration;

pub use shared::{PLAYER_HEIGHT, PLAYER_WIDTH, WORLD_HEIGHT, WORLD_WIDTH};

pub const TICK_DELAY_MS: u64 = 20;
pub const TICKS_PER_SECOND: u32 = (1000 / TICK_DELAY_MS) as u32;
/// One hour.
pub const MAX_TIME_SECONDS: u32 = 3600;

pub const INIT_PLATFORM_GRAVITY: i32 = 7;
pub const LEVELUP_PLATFORM_GRAVITY: i32 = 2;
/// In seconds.
pub const PLATFORM_SPEEDUP_INTERVAL: u32 = 15;
pub const SCORE_PER_SECOND: u32 = 5;

/// Fifteen minutes.
pub const IDLE_TIMEOUT_SECONDS: u64 = 15 * 60;

/// Rules the tick processor and event processor play by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameRules {
    pub ticks_per_second: u32,
    pub init_platform_gravity: i32,
    pub levelup_platform_gravity: i32,
    pub platform_speedup_interval: u32,
    pub score_per_second: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            ticks_per_second: TICKS_PER_SECOND,
            init_platform_gravity: INIT_PLATFORM_GRAVITY,
            levelup_platform_gravity: LEVELUP_PLATFORM_GRAVITY,
            platform_speedup_interval: PLATFORM_SPEEDUP_INTERVAL,
            score_per_second: SCORE_PER_SECOND,
        }
    }
}

/// Pacing of the game loop. Only changeable while the loop is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub tick_delay: Duration,
    pub max_time_seconds: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_delay: Duration::from_millis(TICK_DELAY_MS),
            max_time_seconds: MAX_TIME_SECONDS,
        }
    }
}

/// Command line of the server binary.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Config {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Maximum number of connected sessions
    #[clap(long, default_value = "32")]
    pub max_clients: usize,
    /// Milliseconds to wait between ticks
    #[clap(long, default_value_t = TICK_DELAY_MS)]
    pub tick_delay_ms: u64,
    /// Longest a single game may run
    #[clap(long, default_value_t = MAX_TIME_SECONDS)]
    pub max_time_seconds: u32,
    /// Platform fall speed at the start of a game
    #[clap(long, default_value_t = INIT_PLATFORM_GRAVITY)]
    pub init_platform_gravity: i32,
    /// Platform fall speed added on every level up
    #[clap(long, default_value_t = LEVELUP_PLATFORM_GRAVITY)]
    pub levelup_platform_gravity: i32,
    /// Seconds between level ups
    #[clap(long, default_value_t = PLATFORM_SPEEDUP_INTERVAL)]
    pub platform_speedup_interval: u32,
    /// Seconds without a game before the server shuts down
    #[clap(long, default_value_t = IDLE_TIMEOUT_SECONDS)]
    pub idle_timeout_seconds: u64,
    /// Seed for the random number generator
    #[clap(long)]
    pub seed: Option<u64>,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn game_rules(&self) -> GameRules {
        GameRules {
            init_platform_gravity: self.init_platform_gravity,
            levelup_platform_gravity: self.levelup_platform_gravity,
            // zero would level up on every second boundary forever
            platform_speedup_interval: self.platform_speedup_interval.max(1),
            ..GameRules::default()
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            tick_delay: Duration::from_millis(self.tick_delay_ms),
            max_time_seconds: self.max_time_seconds,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}
