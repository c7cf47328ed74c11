//! Top-level match state machine.
//!
//! ```text
//! WaitingServe --(second connection)--> Rallying --(goal)--> Rallying
//!                                           \--(goal reaching score_to_win)--> Ended
//! Ended --(every connection voted restart)--> Rallying
//! any --(connection lost below two connections)--> WaitingServe
//! ```
//!
//! The controller owns the replication channel, the ball and both paddles.
//! Every mutation happens on the caller's thread inside one of the public
//! operations below; the network layer drives them once per tick, so no two
//! mutations ever overlap.

use crate::ball::BallSimulation;
use crate::events::{EventBus, EventPublisher};
use crate::paddle::PaddleRelay;
use crate::physics::{self, Contact, Court};
use crate::replication::{Outbound, ReplicationChannel, ReplicationError};
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    fields, ClientRequest, ConfigError, ConnectionId, FieldValue, GameEvent, MatchConfig, Phase,
    ServerBroadcast, Side, Vector2,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::sync::mpsc;

/// Number of connections a match needs to stay active.
pub const QUORUM: usize = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("match already has two connections")]
    MatchFull,
    #[error("connection {0} is not part of the match")]
    UnknownConnection(ConnectionId),
    #[error("invalid match configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("replication setup failed: {0}")]
    Replication(#[from] ReplicationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchState {
    pub left_score: u32,
    pub right_score: u32,
    pub phase: Phase,
}

impl MatchState {
    fn new() -> Self {
        Self {
            left_score: 0,
            right_score: 0,
            phase: Phase::WaitingServe,
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }
}

pub struct MatchController {
    config: MatchConfig,
    court: Court,
    channel: ReplicationChannel,
    ball: BallSimulation,
    paddles: PaddleRelay,
    bus: EventBus,
    events: EventPublisher,
    state: MatchState,
    connections: BTreeMap<ConnectionId, Side>,
    restart_votes: BTreeSet<ConnectionId>,
    closed: bool,
    tick: u32,
    rng: StdRng,
}

impl MatchController {
    pub fn new(
        config: MatchConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Self, SessionError> {
        Self::with_rng(config, outbound, StdRng::from_entropy())
    }

    /// Same as [`MatchController::new`] with a deterministic serve sequence.
    pub fn with_seed(
        config: MatchConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
        seed: u64,
    ) -> Result<Self, SessionError> {
        Self::with_rng(config, outbound, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: MatchConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
        rng: StdRng,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let bus = EventBus::new();
        let events = bus.publisher();
        let mut channel = ReplicationChannel::new(outbound);
        channel.declare_field(fields::LEFT_SCORE, FieldValue::Uint(0))?;
        channel.declare_field(fields::RIGHT_SCORE, FieldValue::Uint(0))?;
        channel.declare_field(fields::PHASE, FieldValue::Phase(Phase::WaitingServe))?;
        channel.declare_field(fields::BALL_ACTIVE, FieldValue::Bool(false))?;

        let paddles = PaddleRelay::new(&config, &mut channel)?;
        let mut ball = BallSimulation::new(&config, bus.publisher())?;
        ball.set_active(false);

        Ok(Self {
            court: Court::from_config(&config),
            config,
            channel,
            ball,
            paddles,
            bus,
            events,
            state: MatchState::new(),
            connections: BTreeMap::new(),
            restart_votes: BTreeSet::new(),
            closed: false,
            tick: 0,
            rng,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn ball(&self) -> &BallSimulation {
        &self.ball
    }

    pub fn paddles(&self) -> &PaddleRelay {
        &self.paddles
    }

    pub fn channel(&self) -> &ReplicationChannel {
        &self.channel
    }

    /// Server-local observers (logging, statistics) subscribe here.
    pub fn event_bus(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn side_of(&self, connection_id: ConnectionId) -> Option<Side> {
        self.connections.get(&connection_id).copied()
    }

    pub fn restart_vote_count(&self) -> usize {
        self.restart_votes.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// The side the next connection would play, if a seat is free.
    pub fn next_side(&self) -> Option<Side> {
        if self.connections.len() >= QUORUM {
            return None;
        }
        let taken: BTreeSet<Side> = self.connections.values().copied().collect();
        if taken.contains(&Side::Left) {
            Some(Side::Right)
        } else {
            Some(Side::Left)
        }
    }

    /// Admits a connection: the first free side is Left, then Right. The
    /// rally starts as soon as both sides are present.
    pub fn on_connect(&mut self, connection_id: ConnectionId) -> Result<Side, SessionError> {
        if let Some(side) = self.side_of(connection_id) {
            return Ok(side);
        }
        let side = self.next_side().ok_or(SessionError::MatchFull)?;
        self.connections.insert(connection_id, side);
        self.paddles.assign_owner(side, connection_id);
        self.channel.join(connection_id);
        info!("Connection {} plays {:?}", connection_id, side);

        if self.connections.len() == QUORUM && self.state.phase == Phase::WaitingServe {
            let direction = self.random_serve();
            self.serve(direction);
        }
        self.flush_events();
        Ok(side)
    }

    /// Removes a connection together with its vote and paddle ownership.
    /// Dropping below quorum aborts a running or finished match.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) -> Result<(), SessionError> {
        let side = self
            .connections
            .remove(&connection_id)
            .ok_or(SessionError::UnknownConnection(connection_id))?;

        self.restart_votes.remove(&connection_id);
        self.paddles.release_owner(connection_id);
        self.channel.leave(connection_id);
        info!("Connection {} ({:?}) left the match", connection_id, side);

        if self.connections.len() < QUORUM && self.state.phase != Phase::WaitingServe {
            self.abort_match();
        }
        self.flush_events();
        Ok(())
    }

    /// Network entry point for client messages. The request is queued and
    /// applied on the next [`MatchController::tick`].
    pub fn receive(&mut self, connection_id: ConnectionId, request: ClientRequest) -> bool {
        self.channel.on_client_request(connection_id, request)
    }

    /// Applies every queued request in arrival order.
    pub fn process_requests(&mut self) {
        for (connection_id, request) in self.channel.drain_requests() {
            self.handle_request(connection_id, request);
        }
        self.flush_events();
    }

    /// Processes queued requests, advances the simulation by `dt` seconds
    /// and broadcasts an authoritative snapshot.
    pub fn tick(&mut self, dt: f32) {
        if self.closed {
            return;
        }
        self.tick = self.tick.wrapping_add(1);
        self.process_requests();

        if self.state.phase == Phase::Rallying {
            let left_y = self.paddles.paddle(Side::Left).y;
            let right_y = self.paddles.paddle(Side::Right).y;
            let contacts = physics::step(&self.court, &mut self.ball, left_y, right_y, dt);
            for contact in contacts {
                if let Contact::Goal(goal) = contact {
                    self.server_add_score(goal);
                }
            }
        }

        self.flush_events();
        self.channel.broadcast(ServerBroadcast::Snapshot {
            tick: self.tick,
            ball: self.ball.snapshot(),
            left_paddle_y: self.paddles.paddle(Side::Left).y,
            right_paddle_y: self.paddles.paddle(Side::Right).y,
        });
    }

    fn handle_request(&mut self, connection_id: ConnectionId, request: ClientRequest) {
        match request {
            ClientRequest::MovePaddle { y } => {
                if let Err(e) = self
                    .paddles
                    .request_move(&mut self.channel, connection_id, y)
                {
                    error!("Failed to apply paddle move: {}", e);
                }
            }
            ClientRequest::VoteRestart => self.vote_restart(connection_id),
            ClientRequest::VoteQuit => self.vote_quit(connection_id),
        }
    }

    /// Host-authority path: applies a paddle position without a request.
    pub fn apply_local_move(&mut self, side: Side, y: f32) -> f32 {
        let applied = match self.paddles.apply_authoritative(&mut self.channel, side, y) {
            Ok(applied) => applied,
            Err(e) => {
                error!("Failed to apply local paddle move: {}", e);
                self.paddles.paddle(side).y
            }
        };
        self.flush_events();
        applied
    }

    /// Goal arbitration: the ball crossed `goal`'s boundary, so the opposing
    /// side scores. Ignored unless a rally is in progress.
    pub fn server_add_score(&mut self, goal: Side) {
        if self.state.phase != Phase::Rallying {
            debug!("Ignoring goal on {:?} outside a rally", goal);
            return;
        }
        self.award_point(goal.opponent());
        self.flush_events();
    }

    fn award_point(&mut self, scorer: Side) {
        match scorer {
            Side::Left => {
                self.state.left_score += 1;
                self.replicate(fields::LEFT_SCORE, FieldValue::Uint(self.state.left_score));
            }
            Side::Right => {
                self.state.right_score += 1;
                self.replicate(fields::RIGHT_SCORE, FieldValue::Uint(self.state.right_score));
            }
        }
        let (left, right) = (self.state.left_score, self.state.right_score);
        info!("Goal! {:?} scores ({} - {})", scorer, left, right);
        self.events.publish(GameEvent::ScoreChanged { left, right });

        let win = self.config.score_to_win;
        if left >= win || right >= win {
            let winner = if left >= win { Side::Left } else { Side::Right };
            self.end_match(winner);
        } else {
            // Serve towards the side that conceded.
            self.ball.reset_for_new_rally(scorer.opponent().direction());
        }
    }

    fn end_match(&mut self, winner: Side) {
        self.set_phase(Phase::Ended);
        self.set_ball_active(false);
        self.restart_votes.clear();
        info!(
            "Match over: {:?} wins {} - {}",
            winner, self.state.left_score, self.state.right_score
        );
        self.events.publish(GameEvent::MatchEnded {
            winner,
            left: self.state.left_score,
            right: self.state.right_score,
        });
    }

    /// Records a replay vote. Once every active connection has voted the
    /// match restarts from zero. Votes outside the `Ended` phase, repeated
    /// votes and votes from unknown connections change nothing.
    pub fn vote_restart(&mut self, connection_id: ConnectionId) {
        if !self.connections.contains_key(&connection_id) {
            debug!("Ignoring restart vote from unknown connection {}", connection_id);
            return;
        }
        if self.state.phase != Phase::Ended {
            debug!("Ignoring restart vote from {} during {:?}", connection_id, self.state.phase);
            return;
        }
        if !self.restart_votes.insert(connection_id) {
            return;
        }
        info!(
            "Connection {} voted to restart ({}/{})",
            connection_id,
            self.restart_votes.len(),
            self.connections.len()
        );

        if self.restart_votes.len() == self.connections.len() {
            self.reset_match();
        }
        self.flush_events();
    }

    fn reset_match(&mut self) {
        self.reset_scores();
        self.restart_votes.clear();
        self.events.publish(GameEvent::MatchReset);
        info!("Match restarted");

        let direction = self.random_serve();
        self.serve(direction);
    }

    /// Closes the session for every connection. Any participant may quit.
    pub fn vote_quit(&mut self, connection_id: ConnectionId) {
        if !self.connections.contains_key(&connection_id) || self.closed {
            return;
        }
        info!("Connection {} quit, closing the session", connection_id);
        self.closed = true;
        self.set_ball_active(false);
        self.events.publish(GameEvent::SessionClosed);
        self.flush_events();
    }

    fn abort_match(&mut self) {
        info!("Match aborted: fewer than {} connections", QUORUM);
        self.reset_scores();
        self.restart_votes.clear();
        self.set_ball_active(false);
        self.set_phase(Phase::WaitingServe);
        self.events.publish(GameEvent::MatchAborted);
    }

    fn reset_scores(&mut self) {
        self.state.left_score = 0;
        self.state.right_score = 0;
        self.replicate(fields::LEFT_SCORE, FieldValue::Uint(0));
        self.replicate(fields::RIGHT_SCORE, FieldValue::Uint(0));
        if let Err(e) = self.paddles.reset_positions(&mut self.channel) {
            error!("Failed to reset paddles: {}", e);
        }
    }

    fn serve(&mut self, direction: Vector2) {
        self.set_ball_active(true);
        self.ball.reset_for_new_rally(direction);
        self.set_phase(Phase::Rallying);
        debug!("Serve towards {:?}", direction);
    }

    fn random_serve(&mut self) -> Vector2 {
        if self.rng.gen_bool(0.5) {
            Side::Left.direction()
        } else {
            Side::Right.direction()
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
        self.replicate(fields::PHASE, FieldValue::Phase(phase));
    }

    fn set_ball_active(&mut self, active: bool) {
        self.ball.set_active(active);
        self.replicate(fields::BALL_ACTIVE, FieldValue::Bool(active));
    }

    fn replicate(&mut self, name: &str, value: FieldValue) {
        if let Err(e) = self.channel.set_field(name, value) {
            error!("Failed to replicate {}: {}", name, e);
        }
    }

    /// Runs local subscribers and forwards every pending event to the
    /// replication group.
    fn flush_events(&mut self) {
        for event in self.bus.dispatch() {
            self.channel.broadcast(ServerBroadcast::Event(event));
        }
    }
}
