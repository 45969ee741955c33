use rand::Rng;
use shared::PlatformState;

use crate::config::{WORLD_HEIGHT, WORLD_WIDTH};
use crate::error::GameError;

pub const MIN_WIDTH: i32 = 300;
pub const MAX_WIDTH: i32 = 600;

/// Read-only platform. Moving it produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub width: i32,
    pub x: i32,
    pub y: i32,
}

impl Platform {
    pub fn new(width: i32, x: i32, y: i32) -> Self {
        Self { width, x, y }
    }

    /// Creates a platform with a random width and a random x that keeps it
    /// fully inside the world.
    pub fn generate_at_height<R: Rng + ?Sized>(height: i32, rng: &mut R) -> Result<Self, GameError> {
        if !(0..=WORLD_HEIGHT).contains(&height) {
            return Err(GameError::InvalidArgument(format!(
                "Platform height out of bounds: {}",
                height
            )));
        }
        let width = rng.gen_range(MIN_WIDTH..=MAX_WIDTH);
        let x = rng.gen_range(0..=WORLD_WIDTH - width);
        Ok(Self::new(width, x, height))
    }

    /// The same platform one tick later.
    pub fn advance(&self, gravity: i32) -> Self {
        Self {
            y: self.y + gravity,
            ..*self
        }
    }

    pub fn to_state(&self) -> PlatformState {
        PlatformState {
            width: self.width,
            x: self.x,
            y: self.y,
        }
    }
}
