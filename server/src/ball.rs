//! Authoritative ball state and its three-tier speed progression.
//!
//! The ball only speeds up when it hits a paddle: after `hits_to_medium`
//! paddle contacts within one rally it moves to the medium tier, after
//! `hits_to_fast` to the fast tier. Walls reflect the vertical component and
//! keep the current speed. Every new rally starts again at the slow tier with
//! a zero hit count.

use crate::events::EventPublisher;
use shared::{BallSnapshot, BounceKind, ConfigError, GameEvent, MatchConfig, SpeedLevel, Vector2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub position: Vector2,
    pub velocity: Vector2,
    pub speed_level: SpeedLevel,
    pub paddle_hit_count: u32,
}

impl Default for BallState {
    fn default() -> Self {
        Self {
            position: Vector2::ZERO,
            velocity: Vector2::ZERO,
            speed_level: SpeedLevel::Slow,
            paddle_hit_count: 0,
        }
    }
}

/// Where on a paddle the ball made contact: -1 bottom edge, 0 centre, 1 top
/// edge. Contacts beyond the paddle's extent saturate at the edges.
pub fn hit_factor(ball_y: f32, paddle_y: f32, paddle_height: f32) -> f32 {
    let raw = (ball_y - paddle_y) / paddle_height;
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(-1.0, 1.0)
    }
}

pub struct BallSimulation {
    base_speed: f32,
    hits_to_medium: u32,
    hits_to_fast: u32,
    state: BallState,
    active: bool,
    events: EventPublisher,
}

impl BallSimulation {
    pub fn new(config: &MatchConfig, events: EventPublisher) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            base_speed: config.base_speed,
            hits_to_medium: config.hits_to_medium,
            hits_to_fast: config.hits_to_fast,
            state: BallState::default(),
            active: true,
            events,
        })
    }

    pub fn state(&self) -> &BallState {
        &self.state
    }

    pub fn position(&self) -> Vector2 {
        self.state.position
    }

    pub fn velocity(&self) -> Vector2 {
        self.state.velocity
    }

    pub fn speed_level(&self) -> SpeedLevel {
        self.state.speed_level
    }

    pub fn paddle_hit_count(&self) -> u32 {
        self.state.paddle_hit_count
    }

    pub fn current_speed(&self) -> f32 {
        self.base_speed * self.state.speed_level.multiplier()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Hides or shows the ball. A hidden ball keeps its state but neither
    /// moves nor collides.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Moves the ball without touching its velocity.
    pub fn place(&mut self, position: Vector2) {
        self.state.position = position;
    }

    /// Sends the ball along `direction` at the current tier's speed.
    /// A zero direction serves towards the right.
    pub fn launch(&mut self, direction: Vector2) {
        let mut dir = direction.normalize();
        if dir == Vector2::ZERO {
            dir = Vector2::new(1.0, 0.0);
        }
        self.state.velocity = dir.scale(self.current_speed());
    }

    pub fn reset_for_new_rally(&mut self, direction: Vector2) {
        self.state.paddle_hit_count = 0;
        self.state.speed_level = SpeedLevel::Slow;
        self.state.position = Vector2::ZERO;
        self.launch(direction);
    }

    pub fn on_paddle_collision(
        &mut self,
        ball_y: f32,
        paddle_y: f32,
        paddle_height: f32,
        relative_velocity_x: f32,
    ) {
        let y_factor = hit_factor(ball_y, paddle_y, paddle_height);
        let x_dir = if relative_velocity_x < 0.0 { -1.0 } else { 1.0 };
        let direction = Vector2::new(x_dir, y_factor).normalize();

        self.register_paddle_hit();
        self.state.velocity = direction.scale(self.current_speed());
        self.events.publish(GameEvent::Bounce {
            kind: BounceKind::Paddle,
        });
    }

    pub fn on_wall_collision(&mut self) {
        let reflected = Vector2::new(self.state.velocity.x, -self.state.velocity.y);
        self.state.velocity = reflected.normalize().scale(self.current_speed());
        self.events.publish(GameEvent::Bounce {
            kind: BounceKind::Wall,
        });
    }

    /// Integrates position over `dt` seconds. Hidden balls stay put.
    pub fn advance(&mut self, dt: f32) {
        if !self.active {
            return;
        }
        self.state.position = self.state.position.add(&self.state.velocity.scale(dt));
    }

    pub fn snapshot(&self) -> BallSnapshot {
        BallSnapshot {
            position: self.state.position,
            velocity: self.state.velocity,
            speed_level: self.state.speed_level,
            active: self.active,
        }
    }

    fn register_paddle_hit(&mut self) {
        self.state.paddle_hit_count += 1;
        let hits = self.state.paddle_hit_count;

        self.state.speed_level = match self.state.speed_level {
            SpeedLevel::Slow if hits >= self.hits_to_medium => SpeedLevel::Medium,
            SpeedLevel::Medium if hits >= self.hits_to_fast => SpeedLevel::Fast,
            level => level,
        };
    }
}
