//! Client-side mirror of the replicated match state.
//!
//! Nothing here is authoritative. Field changes overwrite the local copy,
//! snapshots replace the ball and paddle positions, and events are queued
//! for whoever presents the match.

use log::{debug, info};
use shared::{
    fields, BallSnapshot, FieldChange, FieldValue, GameEvent, MatchConfig, Phase, ServerBroadcast,
    Side, SpeedLevel, Vector2,
};

#[derive(Debug, Clone)]
pub struct ClientView {
    pub left_score: u32,
    pub right_score: u32,
    pub phase: Phase,
    pub ball_active: bool,
    pub left_paddle_y: f32,
    pub right_paddle_y: f32,
    pub ball: BallSnapshot,
    /// Tick of the newest snapshot applied.
    pub tick: u32,
    pub winner: Option<Side>,
    config: MatchConfig,
    pending_events: Vec<GameEvent>,
}

impl ClientView {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            left_score: 0,
            right_score: 0,
            phase: Phase::WaitingServe,
            ball_active: false,
            left_paddle_y: 0.0,
            right_paddle_y: 0.0,
            ball: BallSnapshot {
                position: Vector2::ZERO,
                velocity: Vector2::ZERO,
                speed_level: SpeedLevel::Slow,
                active: false,
            },
            tick: 0,
            winner: None,
            config: config.clone(),
            pending_events: Vec::new(),
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    pub fn paddle_y(&self, side: Side) -> f32 {
        match side {
            Side::Left => self.left_paddle_y,
            Side::Right => self.right_paddle_y,
        }
    }

    pub fn apply_broadcast(&mut self, broadcast: &ServerBroadcast) {
        match broadcast {
            ServerBroadcast::FieldChanged(change) => self.apply_field(change),
            ServerBroadcast::Event(event) => self.apply_event(event),
            ServerBroadcast::Snapshot {
                tick,
                ball,
                left_paddle_y,
                right_paddle_y,
            } => {
                // Snapshots travel unordered; keep the newest.
                if *tick < self.tick {
                    return;
                }
                self.tick = *tick;
                self.ball = *ball;
                self.left_paddle_y = *left_paddle_y;
                self.right_paddle_y = *right_paddle_y;
            }
        }
    }

    pub fn apply_field(&mut self, change: &FieldChange) {
        match (change.name.as_str(), change.new) {
            (fields::LEFT_SCORE, FieldValue::Uint(score)) => self.left_score = score,
            (fields::RIGHT_SCORE, FieldValue::Uint(score)) => self.right_score = score,
            (fields::PHASE, FieldValue::Phase(phase)) => {
                self.phase = phase;
                if phase != Phase::Ended {
                    self.winner = None;
                }
            }
            (fields::BALL_ACTIVE, FieldValue::Bool(active)) => self.ball_active = active,
            (fields::LEFT_PADDLE_Y, FieldValue::Float(y)) => {
                self.left_paddle_y = self.config.clamp_paddle_y(y)
            }
            (fields::RIGHT_PADDLE_Y, FieldValue::Float(y)) => {
                self.right_paddle_y = self.config.clamp_paddle_y(y)
            }
            (name, value) => debug!("Ignoring field {} = {:?}", name, value),
        }
    }

    fn apply_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::ScoreChanged { left, right } => {
                self.left_score = *left;
                self.right_score = *right;
            }
            GameEvent::MatchEnded {
                winner,
                left,
                right,
            } => {
                info!("{:?} wins {} - {}", winner, left, right);
                self.winner = Some(*winner);
            }
            GameEvent::MatchReset | GameEvent::MatchAborted => {
                self.winner = None;
            }
            GameEvent::Bounce { .. } | GameEvent::SessionClosed => {}
        }
        self.pending_events.push(event.clone());
    }

    /// Events received since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
