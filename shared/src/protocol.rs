//! Wire protocol between the match server and its connections.
//!
//! Traffic is asymmetric: connections only ever send [`ClientRequest`]s
//! (wrapped in [`Packet::Request`]), which the server validates and may
//! silently drop, while the server fans out [`ServerBroadcast`]s that carry
//! no reply. Neither direction is acknowledged.

use crate::{BounceKind, Phase, Side, SpeedLevel, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;

pub type ConnectionId = u32;

/// Names of the fields the match server replicates.
pub mod fields {
    pub const LEFT_SCORE: &str = "score.left";
    pub const RIGHT_SCORE: &str = "score.right";
    pub const PHASE: &str = "match.phase";
    pub const BALL_ACTIVE: &str = "ball.active";
    pub const LEFT_PADDLE_Y: &str = "paddle.left.y";
    pub const RIGHT_PADDLE_Y: &str = "paddle.right.y";
}

/// Value held by a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Uint(u32),
    Float(f32),
    Bool(bool),
    Phase(Phase),
}

/// One mutation of a replicated field, in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub name: String,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Messages a connection may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Desired centre of the requester's paddle. Clamped server-side.
    MovePaddle { y: f32 },
    VoteRestart,
    VoteQuit,
}

/// Events exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    Bounce { kind: BounceKind },
    ScoreChanged { left: u32, right: u32 },
    MatchEnded { winner: Side, left: u32, right: u32 },
    MatchReset,
    MatchAborted,
    SessionClosed,
}

/// Discriminant of [`GameEvent`], used for typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Bounce,
    ScoreChanged,
    MatchEnded,
    MatchReset,
    MatchAborted,
    SessionClosed,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::Bounce { .. } => EventKind::Bounce,
            GameEvent::ScoreChanged { .. } => EventKind::ScoreChanged,
            GameEvent::MatchEnded { .. } => EventKind::MatchEnded,
            GameEvent::MatchReset => EventKind::MatchReset,
            GameEvent::MatchAborted => EventKind::MatchAborted,
            GameEvent::SessionClosed => EventKind::SessionClosed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub position: Vector2,
    pub velocity: Vector2,
    pub speed_level: SpeedLevel,
    pub active: bool,
}

/// One-way messages from the server to every member of the replication group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerBroadcast {
    FieldChanged(FieldChange),
    Event(GameEvent),
    Snapshot {
        tick: u32,
        ball: BallSnapshot,
        left_paddle_y: f32,
        right_paddle_y: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request {
        sequence: u32,
        request: ClientRequest,
    },
    /// Keeps an idle connection from timing out.
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ConnectionId,
        side: Side,
    },
    Broadcast(ServerBroadcast),
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
}

impl Packet {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(ProtocolError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }
}
