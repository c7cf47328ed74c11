//! Server-side arbitration of paddle positions.
//!
//! Each side's paddle is owned by at most one connection. A position proposed
//! by the owner is clamped to the court and applied unconditionally; there is
//! no limit on how far it may move in a single request. Values that cannot be
//! clamped (NaN) and requests from connections that own no paddle are dropped
//! without any reply.

use crate::replication::{ReplicationChannel, ReplicationError};
use log::debug;
use shared::{fields, ConnectionId, FieldValue, MatchConfig, Side};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleState {
    pub side: Side,
    pub y: f32,
}

pub struct PaddleRelay {
    half_court_height: f32,
    left: PaddleState,
    right: PaddleState,
    left_owner: Option<ConnectionId>,
    right_owner: Option<ConnectionId>,
}

fn field_name(side: Side) -> &'static str {
    match side {
        Side::Left => fields::LEFT_PADDLE_Y,
        Side::Right => fields::RIGHT_PADDLE_Y,
    }
}

impl PaddleRelay {
    /// Creates both paddles at the centre line and declares their replicated
    /// positions on `channel`.
    pub fn new(
        config: &MatchConfig,
        channel: &mut ReplicationChannel,
    ) -> Result<Self, ReplicationError> {
        channel.declare_field(fields::LEFT_PADDLE_Y, FieldValue::Float(0.0))?;
        channel.declare_field(fields::RIGHT_PADDLE_Y, FieldValue::Float(0.0))?;
        Ok(Self {
            half_court_height: config.half_court_height,
            left: PaddleState {
                side: Side::Left,
                y: 0.0,
            },
            right: PaddleState {
                side: Side::Right,
                y: 0.0,
            },
            left_owner: None,
            right_owner: None,
        })
    }

    pub fn paddle(&self, side: Side) -> &PaddleState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn assign_owner(&mut self, side: Side, connection_id: ConnectionId) {
        match side {
            Side::Left => self.left_owner = Some(connection_id),
            Side::Right => self.right_owner = Some(connection_id),
        }
    }

    /// Drops whatever paddle `connection_id` owned.
    pub fn release_owner(&mut self, connection_id: ConnectionId) -> Option<Side> {
        let side = self.owner_side(connection_id)?;
        match side {
            Side::Left => self.left_owner = None,
            Side::Right => self.right_owner = None,
        }
        Some(side)
    }

    pub fn owner(&self, side: Side) -> Option<ConnectionId> {
        match side {
            Side::Left => self.left_owner,
            Side::Right => self.right_owner,
        }
    }

    pub fn owner_side(&self, connection_id: ConnectionId) -> Option<Side> {
        if self.left_owner == Some(connection_id) {
            Some(Side::Left)
        } else if self.right_owner == Some(connection_id) {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Handles a move request from a connection. Returns the applied
    /// position, or `None` when the request was dropped.
    pub fn request_move(
        &mut self,
        channel: &mut ReplicationChannel,
        connection_id: ConnectionId,
        proposed_y: f32,
    ) -> Result<Option<f32>, ReplicationError> {
        let Some(side) = self.owner_side(connection_id) else {
            debug!(
                "Connection {} owns no paddle, dropping move request",
                connection_id
            );
            return Ok(None);
        };
        if proposed_y.is_nan() {
            debug!("Dropping NaN paddle position from {}", connection_id);
            return Ok(None);
        }
        self.apply_authoritative(channel, side, proposed_y).map(Some)
    }

    /// Applies a position on behalf of a caller that already holds server
    /// authority. Clamped exactly like a request.
    pub fn apply_authoritative(
        &mut self,
        channel: &mut ReplicationChannel,
        side: Side,
        y: f32,
    ) -> Result<f32, ReplicationError> {
        let clamped = if y.is_nan() {
            self.paddle(side).y
        } else {
            y.clamp(-self.half_court_height, self.half_court_height)
        };

        match side {
            Side::Left => self.left.y = clamped,
            Side::Right => self.right.y = clamped,
        }
        channel.set_field(field_name(side), FieldValue::Float(clamped))?;
        Ok(clamped)
    }

    /// Moves both paddles back to the centre line.
    pub fn reset_positions(
        &mut self,
        channel: &mut ReplicationChannel,
    ) -> Result<(), ReplicationError> {
        self.apply_authoritative(channel, Side::Left, 0.0)?;
        self.apply_authoritative(channel, Side::Right, 0.0)?;
        Ok(())
    }
}
