//! Types shared by the match server and its clients: the wire protocol,
//! match configuration, court geometry helpers and the paddle driver used by
//! the connection that owns a paddle.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod driver;
pub mod protocol;
pub mod vector;

pub use config::{ConfigError, MatchConfig};
pub use driver::{PaddleCommand, PaddleDriver};
pub use protocol::{
    fields, BallSnapshot, ClientRequest, ConnectionId, EventKind, FieldChange, FieldValue,
    GameEvent, Packet, ProtocolError, ServerBroadcast, PROTOCOL_VERSION,
};
pub use vector::Vector2;

/// Speed multipliers for the slow, medium and fast tiers.
///
/// Derived from the 254 µs : 190 µs : 127 µs horizontal timing of the arcade
/// cabinet, i.e. 1 : 1.3368 : 2.
pub const SPEED_MULTIPLIERS: [f32; 3] = [1.0, 1.3368, 2.0];

/// Axis magnitudes below this are treated as "no input".
pub const AXIS_DEAD_ZONE: f32 = 0.001;

/// One of the two logical halves of the court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Unit x direction pointing at this side's goal.
    pub fn direction(self) -> Vector2 {
        match self {
            Side::Left => Vector2 { x: -1.0, y: 0.0 },
            Side::Right => Vector2 { x: 1.0, y: 0.0 },
        }
    }
}

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    WaitingServe,
    Rallying,
    Ended,
}

/// Discrete ball speed tier, advanced only by paddle contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpeedLevel {
    Slow,
    Medium,
    Fast,
}

impl SpeedLevel {
    pub fn multiplier(self) -> f32 {
        SPEED_MULTIPLIERS[self as usize]
    }
}

/// Surface the ball bounced off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BounceKind {
    Paddle,
    Wall,
}
