//! Paddle input sources and request sequencing for the headless client.

use crate::game::ClientView;
use shared::{ClientRequest, MatchConfig, Packet, PaddleCommand, PaddleDriver, Side};

/// Produces a movement axis in `[-1, 1]` every input tick.
pub trait AxisSource: Send {
    fn axis(&mut self, view: &ClientView, side: Side, paddle_y: f32) -> f32;
}

/// Follows the ball's height, proportionally to the distance between the
/// ball and the paddle centre.
#[derive(Debug, Clone)]
pub struct TrackingAxis {
    pub tracking_speed: f32,
}

impl TrackingAxis {
    pub fn new(tracking_speed: f32) -> Self {
        Self { tracking_speed }
    }
}

impl AxisSource for TrackingAxis {
    fn axis(&mut self, view: &ClientView, _side: Side, paddle_y: f32) -> f32 {
        if !view.ball_active {
            return 0.0;
        }
        let diff = view.ball.position.y - paddle_y;
        (diff * self.tracking_speed).clamp(-1.0, 1.0)
    }
}

/// Replays a fixed sequence of axis values, looping forever.
#[derive(Debug, Clone)]
pub struct ScriptedAxis {
    values: Vec<f32>,
    index: usize,
}

impl ScriptedAxis {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, index: 0 }
    }
}

impl AxisSource for ScriptedAxis {
    fn axis(&mut self, _view: &ClientView, _side: Side, _paddle_y: f32) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.index % self.values.len()];
        self.index = (self.index + 1) % self.values.len();
        value
    }
}

/// Turns axis samples into sequenced request packets.
pub struct InputManager {
    next_sequence: u32,
    driver: PaddleDriver,
    source: Box<dyn AxisSource>,
}

impl InputManager {
    pub fn new(config: &MatchConfig, source: Box<dyn AxisSource>) -> Self {
        Self {
            next_sequence: 1,
            driver: PaddleDriver::new(config, false),
            source,
        }
    }

    pub fn paddle_y(&self) -> f32 {
        self.driver.y()
    }

    /// Adopts the authoritative paddle position.
    pub fn sync(&mut self, y: f32) {
        self.driver.sync(y);
    }

    /// Samples the axis source and returns the move request to send, if the
    /// paddle should move this tick.
    pub fn update(&mut self, view: &ClientView, side: Side, dt: f32) -> Option<Packet> {
        let axis = self.source.axis(view, side, self.driver.y());
        match self.driver.update(axis, dt)? {
            PaddleCommand::Send(request) => Some(self.request(request)),
            // Remote clients never hold authority.
            PaddleCommand::ApplyLocal { .. } => None,
        }
    }

    /// Wraps a request with the next sequence number.
    pub fn request(&mut self, request: ClientRequest) -> Packet {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Packet::Request { sequence, request }
    }
}
