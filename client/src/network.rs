use crate::game::ClientView;
use crate::input::{AxisSource, InputManager};
use log::{debug, error, info, warn};
use shared::{
    fields, ClientRequest, FieldValue, GameEvent, MatchConfig, Packet, ServerBroadcast, Side,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Idle time after which a heartbeat is sent.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// How the headless client reacts to the end of a match.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Vote for a rematch automatically when a match ends.
    pub auto_replay: bool,
    /// Quit the session after this many finished matches.
    pub max_matches: Option<u32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_replay: true,
            max_matches: None,
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    side: Option<Side>,
    connected: bool,
    closed: bool,

    view: ClientView,
    input: InputManager,
    options: SessionOptions,
    matches_played: u32,
    last_sent: Instant,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        config: &MatchConfig,
        source: Box<dyn AxisSource>,
        options: SessionOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            side: None,
            connected: false,
            closed: false,
            view: ClientView::new(config),
            input: InputManager::new(config, source),
            options,
            matches_played: 0,
            last_sent: Instant::now(),
        })
    }

    pub fn view(&self) -> &ClientView {
        &self.view
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn matches_played(&self) -> u32 {
        self.matches_played
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.to_bytes()?;
        self.socket.send_to(&data, self.server_addr).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn send_request(&mut self, request: ClientRequest) {
        let packet = self.input.request(request);
        if let Err(e) = self.send_packet(&packet).await {
            error!("Error sending request: {}", e);
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id, side } => {
                info!("Connected! Client ID: {}, playing {:?}", client_id, side);
                self.client_id = Some(client_id);
                self.side = Some(side);
                self.connected = true;
            }

            Packet::Broadcast(broadcast) => {
                self.apply_broadcast(&broadcast);
                for event in self.view.take_events() {
                    self.handle_event(event).await;
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.closed = true;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn apply_broadcast(&mut self, broadcast: &ServerBroadcast) {
        self.view.apply_broadcast(broadcast);

        let own_field = match self.side {
            Some(Side::Left) => fields::LEFT_PADDLE_Y,
            Some(Side::Right) => fields::RIGHT_PADDLE_Y,
            None => return,
        };
        if let ServerBroadcast::FieldChanged(change) = broadcast {
            if let (true, FieldValue::Float(y)) = (change.name == own_field, change.new) {
                self.input.sync(y);
            }
        }
    }

    async fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::MatchEnded { .. } => {
                self.matches_played += 1;
                let done = self
                    .options
                    .max_matches
                    .map_or(false, |max| self.matches_played >= max);

                if done {
                    info!("Played {} matches, quitting", self.matches_played);
                    self.send_request(ClientRequest::VoteQuit).await;
                } else if self.options.auto_replay {
                    self.send_request(ClientRequest::VoteRestart).await;
                }
            }
            GameEvent::ScoreChanged { left, right } => {
                info!("Score {} - {}", left, right);
            }
            GameEvent::MatchReset => info!("Rematch started"),
            GameEvent::MatchAborted => info!("Opponent left, waiting for a new one"),
            GameEvent::SessionClosed => info!("Session closed by a player"),
            GameEvent::Bounce { kind } => debug!("Bounce off {:?}", kind),
        }
    }

    /// Runs until the server ends the session.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let input_period = Duration::from_millis(16);
        let mut input_interval = interval(input_period);
        let mut buffer = [0u8; 2048];

        while !self.closed {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match Packet::from_bytes(&buffer[0..len]) {
                            Ok(packet) => self.handle_packet(packet).await,
                            Err(e) => warn!("{}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    let Some(side) = self.side else { continue };
                    if !self.connected {
                        continue;
                    }

                    let dt = input_period.as_secs_f32();
                    if let Some(packet) = self.input.update(&self.view, side, dt) {
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending input: {}", e);
                        }
                    } else if self.last_sent.elapsed() >= HEARTBEAT_INTERVAL {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }

    /// Leaves the match without closing the session for the other player.
    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.connected {
            self.send_packet(&Packet::Disconnect).await?;
            self.connected = false;
        }
        Ok(())
    }
}
