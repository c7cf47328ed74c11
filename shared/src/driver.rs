//! Paddle movement on the side of the connection that owns the paddle.
//!
//! The owner integrates its input axis over elapsed time against the last
//! position it knows about and produces a target. A connection that already
//! holds server authority (the hosting process) applies the target directly;
//! any other connection sends it as a [`ClientRequest::MovePaddle`]. The
//! server clamps both the same way.

use crate::{ClientRequest, MatchConfig, AXIS_DEAD_ZONE};

/// What the owner should do with a newly computed paddle target.
#[derive(Debug, Clone, PartialEq)]
pub enum PaddleCommand {
    ApplyLocal { y: f32 },
    Send(ClientRequest),
}

#[derive(Debug, Clone)]
pub struct PaddleDriver {
    y: f32,
    speed: f32,
    half_court_height: f32,
    has_authority: bool,
}

impl PaddleDriver {
    pub fn new(config: &MatchConfig, has_authority: bool) -> Self {
        Self {
            y: 0.0,
            speed: config.paddle_speed,
            half_court_height: config.half_court_height,
            has_authority,
        }
    }

    /// Last known (or locally predicted) paddle centre.
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Adopts the authoritative position replicated by the server.
    pub fn sync(&mut self, authoritative_y: f32) {
        if authoritative_y.is_finite() {
            self.y = authoritative_y;
        }
    }

    /// Integrates `axis` (expected in `[-1, 1]`) over `dt` seconds.
    ///
    /// Returns `None` while the axis rests inside the dead zone; the paddle
    /// then stays where it is.
    pub fn update(&mut self, axis: f32, dt: f32) -> Option<PaddleCommand> {
        if !axis.is_finite() || axis.abs() < AXIS_DEAD_ZONE {
            return None;
        }

        let axis = axis.clamp(-1.0, 1.0);
        let target = (self.y + axis * self.speed * dt)
            .clamp(-self.half_court_height, self.half_court_height);
        self.y = target;

        if self.has_authority {
            Some(PaddleCommand::ApplyLocal { y: target })
        } else {
            Some(PaddleCommand::Send(ClientRequest::MovePaddle { y: target }))
        }
    }
}
