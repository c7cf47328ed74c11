//! Server network layer: UDP transport around the match controller.
//!
//! Three background tasks feed the main loop. The receiver decodes datagrams,
//! the sender encodes replies and replicated broadcasts, and the timeout
//! checker drops silent connections. The main loop owns the
//! [`MatchController`] and is the only place match state is mutated.

use crate::client_manager::{ClientManager, CONNECTION_TIMEOUT};
use crate::match_controller::{MatchController, SessionError, QUORUM};
use crate::physics::MAX_DELTA_TIME;
use crate::replication::Outbound;
use log::{debug, error, info, warn};
use shared::{MatchConfig, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
}

/// Direct replies that bypass the replication group, e.g. handshake results.
#[derive(Debug)]
pub struct Reply {
    pub packet: Packet,
    pub addr: SocketAddr,
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    controller: MatchController,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    reply_rx: Option<mpsc::UnboundedReceiver<Reply>>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        config: MatchConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let controller = MatchController::new(config, outbound_tx)?;

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(QUORUM))),
            controller,
            tick_duration,
            server_tx,
            server_rx,
            reply_tx,
            reply_rx: Some(reply_rx),
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn controller(&self) -> &MatchController {
        &self.controller
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::from_bytes(&buffer[0..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that encodes and sends replies and replicated broadcasts.
    /// Broadcasts addressed to connections without a known address are
    /// dropped.
    fn spawn_network_sender(&mut self) -> Option<JoinHandle<()>> {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut reply_rx = self.reply_rx.take()?;
        let mut outbound_rx = self.outbound_rx.take()?;

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(reply) = reply_rx.recv() => {
                        Self::send_packet_impl(&socket, &reply.packet, reply.addr).await;
                    }
                    Some(outbound) = outbound_rx.recv() => {
                        let addr = clients.read().await.addr_of(outbound.connection_id);
                        match addr {
                            Some(addr) => {
                                let packet = Packet::Broadcast(outbound.message);
                                Self::send_packet_impl(&socket, &packet, addr).await;
                            }
                            None => debug!(
                                "No address for connection {}, dropping broadcast",
                                outbound.connection_id
                            ),
                        }
                    }
                    else => break,
                }
            }
        }))
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts(CONNECTION_TIMEOUT);
                for client_id in timed_out {
                    info!("Client {} timed out", client_id);
                    if server_tx
                        .send(ServerMessage::ClientTimeout { client_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) {
        let data = match packet.to_bytes() {
            Ok(data) => data,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        if let Err(e) = socket.send_to(&data, addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.reply_tx.send(Reply { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::Request { sequence, request } => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    match clients.find_client_by_addr(addr) {
                        Some(id) if clients.accept_sequence(id, sequence) => Some(id),
                        Some(id) => {
                            debug!("Dropping stale request {} from {}", sequence, id);
                            None
                        }
                        None => None,
                    }
                };

                if let Some(client_id) = client_id {
                    self.controller.receive(client_id, request);
                }
            }

            Packet::Heartbeat => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.touch(client_id);
                }
            }

            Packet::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(client_id) = client_id {
                    self.clients.write().await.remove_client(&client_id);
                    self.drop_connection(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A repeated handshake from a known address gets the same answer again.
        let existing = self.clients.read().await.find_client_by_addr(addr);
        if let Some(client_id) = existing {
            if let Some(side) = self.controller.side_of(client_id) {
                self.send_packet(Packet::Connected { client_id, side }, addr);
                return;
            }
        }

        let seat = match self.controller.next_side() {
            Some(side) => self
                .clients
                .write()
                .await
                .add_client(addr)
                .map(|client_id| (client_id, side)),
            None => None,
        };
        let Some((client_id, side)) = seat else {
            self.reject_full(addr);
            return;
        };

        // The reply is queued before the join so the handshake precedes the
        // initial field values on the wire.
        self.send_packet(Packet::Connected { client_id, side }, addr);

        match self.controller.on_connect(client_id) {
            Ok(_) => {}
            Err(SessionError::MatchFull) => {
                self.clients.write().await.remove_client(&client_id);
                self.reject_full(addr);
            }
            Err(e) => error!("Failed to admit client {}: {}", client_id, e),
        }
    }

    fn reject_full(&self, addr: SocketAddr) {
        self.send_packet(
            Packet::Disconnected {
                reason: "Server full".to_string(),
            },
            addr,
        );
    }

    fn drop_connection(&mut self, client_id: u32) {
        if let Err(e) = self.controller.on_disconnect(client_id) {
            debug!("{}", e);
        }
    }

    /// Tells every remaining client the session is over. Called once the
    /// sender has flushed, so these datagrams follow the final broadcasts.
    async fn close_session(socket: &UdpSocket, clients: &RwLock<ClientManager>) {
        let addrs = clients.read().await.get_client_addrs();
        let packet = Packet::Disconnected {
            reason: "Session closed".to_string(),
        };
        for (_, addr) in addrs {
            Self::send_packet_impl(socket, &packet, addr).await;
        }
    }

    /// Main server loop. Returns once the session was closed by a player.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.spawn_network_receiver();
        let sender = self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();
        let mut session_closed = false;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.drop_connection(client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_DELTA_TIME);
                    last_tick = now;

                    self.controller.tick(dt);

                    if self.controller.is_closed() {
                        session_closed = true;
                        break;
                    }

                    let tick = self.controller.tick_count();
                    if tick % 60 == 0 && self.controller.connection_count() > 0 {
                        debug!(
                            "Tick {}: {} connections, {:.1}Hz, phase {:?}",
                            tick,
                            self.controller.connection_count(),
                            1.0 / dt.max(f32::EPSILON),
                            self.controller.phase()
                        );
                    }
                },
            }
        }

        // Closing both queues lets the sender flush what is left and exit.
        let Server {
            socket,
            clients,
            controller,
            reply_tx,
            ..
        } = self;
        drop(controller);
        drop(reply_tx);
        if let Some(sender) = sender {
            sender.await?;
        }
        if session_closed {
            Self::close_session(&socket, &clients).await;
            info!("Session closed");
        }
        Ok(())
    }
}
