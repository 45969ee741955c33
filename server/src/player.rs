//! Player entity and its per-tick physics.
//!
//! Position is only ever changed by [`Player::advance`]. Everything else
//! (velocity from control events, score from the tick processor) goes
//! through explicit setters so the store can keep each player behind its
//! own lock.

use rand::Rng;
use shared::PlayerState;

use crate::config::{PLAYER_HEIGHT, PLAYER_WIDTH, WORLD_HEIGHT, WORLD_WIDTH};
use crate::platform::Platform;

/// Added to the vertical velocity on every tick.
pub const GRAVITY: i32 = 2;
pub const MAX_PLAYER_X: i32 = WORLD_WIDTH - PLAYER_WIDTH;
/// Also the floor: reaching it takes the player out of the game.
pub const MAX_PLAYER_Y: i32 = WORLD_HEIGHT - PLAYER_HEIGHT;
/// Players may jump above the visible area.
pub const MIN_PLAYER_Y: i32 = -500;
/// Clearance above the platform a new player spawns on.
pub const SPAWN_HEIGHT: i32 = PLAYER_HEIGHT + 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    id: String,
    name: String,
    color: String,
    x: i32,
    y: i32,
    x_velocity: i32,
    y_velocity: i32,
    score: u32,
    changed: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            x,
            y,
            x_velocity: 0,
            y_velocity: 0,
            score: 0,
            changed: true,
        }
    }

    /// New player with a random colour, centred horizontally over `platform`
    /// and [`SPAWN_HEIGHT`] above it.
    pub fn create_above_platform<R: Rng + ?Sized>(
        id: impl Into<String>,
        name: impl Into<String>,
        platform: &Platform,
        rng: &mut R,
    ) -> Self {
        let x = platform.x + (platform.width - PLAYER_WIDTH) / 2;
        let y = platform.y - SPAWN_HEIGHT;
        Self::new(id, name, random_color(rng), x, y)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn x_velocity(&self) -> i32 {
        self.x_velocity
    }

    pub fn y_velocity(&self) -> i32 {
        self.y_velocity
    }

    pub fn set_velocity(&mut self, x_velocity: i32, y_velocity: i32) {
        self.x_velocity = x_velocity;
        self.y_velocity = y_velocity;
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn add_to_score(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Moves the player to its position on the next tick.
    ///
    /// `platforms` must already be at their next-tick positions. When
    /// several platforms collide, the last one in the list decides where the
    /// player lands.
    pub fn advance(&mut self, platforms: &[Platform], platform_gravity: i32) {
        let mut new_x = self.x + self.x_velocity;
        if new_x > MAX_PLAYER_X {
            new_x = MAX_PLAYER_X;
            self.x_velocity = 0;
        } else if new_x < 0 {
            new_x = 0;
            self.x_velocity = 0;
        }
        if new_x != self.x {
            self.x = new_x;
            self.changed = true;
        }

        // applied while resting too, the collision pass below undoes it
        self.y_velocity += GRAVITY;
        let last_y = self.y;
        let mut new_y = self.y + self.y_velocity;
        if new_y > MAX_PLAYER_Y {
            new_y = MAX_PLAYER_Y;
            self.y_velocity = 0;
        } else if new_y < MIN_PLAYER_Y {
            new_y = MIN_PLAYER_Y;
            self.y_velocity = 0;
        }
        if new_y != self.y {
            self.y = new_y;
            self.changed = true;
        }

        for platform in platforms {
            let collided = self.is_touching(platform) || self.crosses(last_y, platform);
            if collided && self.y_velocity > 0 {
                self.y = platform.y - PLAYER_HEIGHT;
                self.y_velocity = platform_gravity;
            }
        }
    }

    fn overlaps_horizontally(&self, platform: &Platform) -> bool {
        self.x + PLAYER_WIDTH >= platform.x && platform.x + platform.width >= self.x
    }

    fn is_touching(&self, platform: &Platform) -> bool {
        let straddles = self.y < platform.y && platform.y < self.y + PLAYER_HEIGHT;
        straddles && self.overlaps_horizontally(platform)
    }

    /// True if the platform's y lies between `last_y` and the current y.
    fn crosses(&self, last_y: i32, platform: &Platform) -> bool {
        if !self.overlaps_horizontally(platform) {
            return false;
        }
        (platform.y - last_y).signum() != (platform.y - self.y).signum()
    }

    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            name: self.name.clone(),
            color: self.color.clone(),
            x: self.x,
            y: self.y,
            score: self.score,
        }
    }
}

/// `#rrggbb`
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..=0xff_ffffu32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn player_at(x: i32, y: i32) -> Player {
        Player::new("c1", "alice", "#ffffff", x, y)
    }

    #[test]
    fn test_falls_under_gravity() {
        let mut player = player_at(100, 100);
        player.clear_changed();

        player.advance(&[], 7);
        assert_eq!(player.y_velocity(), GRAVITY);
        assert_eq!(player.y(), 100 + GRAVITY);
        assert!(player.has_changed());

        player.advance(&[], 7);
        assert_eq!(player.y_velocity(), 2 * GRAVITY);
        assert_eq!(player.y(), 100 + 3 * GRAVITY);
        assert_eq!(player.x(), 100);
    }

    #[test]
    fn test_horizontal_movement_and_clamping() {
        let mut player = player_at(100, 0);
        player.set_velocity(20, 0);
        player.advance(&[], 7);
        assert_eq!(player.x(), 120);
        assert_eq!(player.x_velocity(), 20);

        let mut player = player_at(MAX_PLAYER_X - 5, 0);
        player.set_velocity(20, 0);
        player.advance(&[], 7);
        assert_eq!(player.x(), MAX_PLAYER_X);
        assert_eq!(player.x_velocity(), 0);

        let mut player = player_at(5, 0);
        player.set_velocity(-20, 0);
        player.advance(&[], 7);
        assert_eq!(player.x(), 0);
        assert_eq!(player.x_velocity(), 0);
    }

    #[test]
    fn test_vertical_clamping() {
        let mut player = player_at(0, MAX_PLAYER_Y - 1);
        player.set_velocity(0, 30);
        player.advance(&[], 7);
        assert_eq!(player.y(), MAX_PLAYER_Y);
        assert_eq!(player.y_velocity(), 0);

        let mut player = player_at(0, MIN_PLAYER_Y + 10);
        player.set_velocity(0, -100);
        player.advance(&[], 7);
        assert_eq!(player.y(), MIN_PLAYER_Y);
        assert_eq!(player.y_velocity(), 0);
    }

    #[test]
    fn test_unchanged_when_clamped_in_place() {
        let mut player = player_at(0, MAX_PLAYER_Y);
        player.clear_changed();
        player.set_velocity(-20, 0);
        player.advance(&[], 7);
        assert_eq!(player.x(), 0);
        assert_eq!(player.y(), MAX_PLAYER_Y);
        assert!(!player.has_changed());
    }

    #[test]
    fn test_lands_on_crossed_platform() {
        let platform = Platform::new(300, 0, 500);
        // feet at 480, falls 30px past the platform top in one tick
        let mut player = player_at(100, 440);
        player.set_velocity(0, 48);
        player.advance(&[platform], 9);

        assert_eq!(player.y(), 500 - PLAYER_HEIGHT);
        assert_eq!(player.y_velocity(), 9);
    }

    #[test]
    fn test_lands_on_straddled_platform() {
        let platform = Platform::new(300, 0, 500);
        let mut player = player_at(100, 470);
        player.advance(&[platform], 7);

        assert_eq!(player.y(), 460);
        assert_eq!(player.y_velocity(), 7);
    }

    #[test]
    fn test_rides_platform_down() {
        let mut platform = Platform::new(300, 0, 500);
        let mut player = player_at(100, 460);
        player.set_velocity(0, 7);
        for _ in 0..10 {
            platform = platform.advance(7);
            player.advance(&[platform], 7);
            assert_eq!(player.y(), platform.y - PLAYER_HEIGHT);
            assert_eq!(player.y_velocity(), 7);
        }
    }

    #[test]
    fn test_no_collision_without_horizontal_overlap() {
        let platform = Platform::new(300, 500, 500);
        let mut player = player_at(100, 470);
        player.advance(&[platform], 7);
        assert_eq!(player.y(), 472);
        assert_eq!(player.y_velocity(), GRAVITY);
    }

    #[test]
    fn test_edges_count_as_overlap() {
        // right edge of player exactly on platform's left edge
        let platform = Platform::new(300, 140, 500);
        let mut player = player_at(100, 470);
        player.advance(&[platform], 7);
        assert_eq!(player.y(), 460);
    }

    #[test]
    fn test_rising_player_passes_through() {
        let platform = Platform::new(300, 0, 500);
        let mut player = player_at(100, 520);
        player.set_velocity(0, -40);
        player.advance(&[platform], 7);
        assert_eq!(player.y(), 482);
        assert_eq!(player.y_velocity(), -38);
    }

    #[test]
    fn test_crossing_two_platforms_lands_on_higher_in_any_order() {
        let higher = Platform::new(300, 0, 450);
        let lower = Platform::new(300, 0, 500);
        for platforms in [[higher, lower], [lower, higher]] {
            let mut player = player_at(100, 400);
            player.set_velocity(0, 118);
            player.advance(&platforms, 7);
            assert_eq!(player.y(), 450 - PLAYER_HEIGHT);
            assert_eq!(player.y_velocity(), 7);
        }
    }

    #[test]
    fn test_create_above_platform() {
        let mut rng = StdRng::seed_from_u64(3);
        let platform = Platform::new(300, 100, 700);
        let player = Player::create_above_platform("c1", "alice", &platform, &mut rng);

        assert_eq!(player.id(), "c1");
        assert_eq!(player.name(), "alice");
        assert_eq!(player.x(), 100 + (300 - PLAYER_WIDTH) / 2);
        assert_eq!(player.y(), 700 - SPAWN_HEIGHT);
        assert_eq!(player.score(), 0);
        assert_eq!((player.x_velocity(), player.y_velocity()), (0, 0));
        assert!(player.has_changed());
    }

    #[test]
    fn test_random_color_format() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let color = random_color(&mut rng);
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_score_and_state() {
        let mut player = player_at(10, 20);
        player.add_to_score(5);
        player.add_to_score(5);

        let state = player.to_state();
        assert_eq!(state.name, "alice");
        assert_eq!(state.color, "#ffffff");
        assert_eq!((state.x, state.y, state.score), (10, 20, 10));
    }
}
