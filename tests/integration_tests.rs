//! Integration tests for the match server over real UDP sockets.
//!
//! Each test starts a server on an ephemeral port and talks to it with raw
//! sockets speaking the wire protocol.

use server::network::Server;
use shared::{
    fields, ClientRequest, FieldValue, GameEvent, MatchConfig, Packet, Phase, ServerBroadcast,
    Side, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

type RunResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

async fn start_server(config: MatchConfig) -> (SocketAddr, JoinHandle<RunResult>) {
    let server = Server::new("127.0.0.1:0", Duration::from_millis(10), config)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    (addr, tokio::spawn(server.run()))
}

async fn socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn send(socket: &UdpSocket, to: SocketAddr, packet: &Packet) {
    socket.send_to(&packet.to_bytes().unwrap(), to).await.unwrap();
}

/// Reads packets until one satisfies `pred`, discarding the rest.
async fn recv_matching<F>(socket: &UdpSocket, pred: F) -> Packet
where
    F: Fn(&Packet) -> bool,
{
    timeout(Duration::from_secs(3), async {
        let mut buf = [0u8; 2048];
        loop {
            let (len, _) = socket.recv_from(&mut buf).await.unwrap();
            let packet = Packet::from_bytes(&buf[..len]).unwrap();
            if pred(&packet) {
                return packet;
            }
        }
    })
    .await
    .expect("timed out waiting for packet")
}

async fn connect(socket: &UdpSocket, server: SocketAddr) -> (u32, Side) {
    send(
        socket,
        server,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await;
    match recv_matching(socket, |p| matches!(p, Packet::Connected { .. })).await {
        Packet::Connected { client_id, side } => (client_id, side),
        _ => unreachable!(),
    }
}

fn field_update(packet: &Packet, name: &str) -> Option<FieldValue> {
    match packet {
        Packet::Broadcast(ServerBroadcast::FieldChanged(change)) if change.name == name => {
            Some(change.new)
        }
        _ => None,
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn handshake_assigns_sides_and_starts_match() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let left = socket().await;
        let right = socket().await;

        assert_eq!(connect(&left, server).await.1, Side::Left);

        // A joining connection receives every field's current value.
        let initial = recv_matching(&left, |p| field_update(p, fields::LEFT_SCORE).is_some()).await;
        match initial {
            Packet::Broadcast(ServerBroadcast::FieldChanged(change)) => {
                assert_eq!(change.old, FieldValue::Uint(0));
                assert_eq!(change.new, FieldValue::Uint(0));
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        assert_eq!(connect(&right, server).await.1, Side::Right);

        recv_matching(&left, |p| {
            field_update(p, fields::PHASE) == Some(FieldValue::Phase(Phase::Rallying))
        })
        .await;
        let snapshot = recv_matching(&right, |p| {
            matches!(p, Packet::Broadcast(ServerBroadcast::Snapshot { .. }))
        })
        .await;
        match snapshot {
            Packet::Broadcast(ServerBroadcast::Snapshot { ball, .. }) => assert!(ball.active),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn third_connection_is_refused() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let a = socket().await;
        let b = socket().await;
        let c = socket().await;
        connect(&a, server).await;
        connect(&b, server).await;

        send(
            &c,
            server,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
            },
        )
        .await;
        let reply = recv_matching(&c, |_| true).await;
        assert_eq!(
            reply,
            Packet::Disconnected {
                reason: "Server full".to_string()
            }
        );
    }

    #[tokio::test]
    async fn out_of_range_move_is_clamped_and_replicated() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let left = socket().await;
        let right = socket().await;
        connect(&left, server).await;
        connect(&right, server).await;

        send(
            &left,
            server,
            &Packet::Request {
                sequence: 1,
                request: ClientRequest::MovePaddle { y: 6.0 },
            },
        )
        .await;

        let update =
            recv_matching(&right, |p| field_update(p, fields::LEFT_PADDLE_Y).is_some()).await;
        assert_eq!(
            field_update(&update, fields::LEFT_PADDLE_Y),
            Some(FieldValue::Float(4.5))
        );
    }

    #[tokio::test]
    async fn stale_requests_are_ignored() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let left = socket().await;
        let right = socket().await;
        connect(&left, server).await;
        connect(&right, server).await;

        for (sequence, y) in [(5, 1.0), (3, -1.0), (6, 2.0)] {
            send(
                &left,
                server,
                &Packet::Request {
                    sequence,
                    request: ClientRequest::MovePaddle { y },
                },
            )
            .await;
        }

        let mut seen = Vec::new();
        while !seen.contains(&FieldValue::Float(2.0)) {
            let update =
                recv_matching(&right, |p| field_update(p, fields::LEFT_PADDLE_Y).is_some()).await;
            seen.extend(field_update(&update, fields::LEFT_PADDLE_Y));
        }
        assert!(!seen.contains(&FieldValue::Float(-1.0)));
    }

    #[tokio::test]
    async fn quit_closes_session_for_everyone() {
        let (server, handle) = start_server(MatchConfig::default()).await;
        let left = socket().await;
        let right = socket().await;
        connect(&left, server).await;
        connect(&right, server).await;

        send(
            &left,
            server,
            &Packet::Request {
                sequence: 1,
                request: ClientRequest::VoteQuit,
            },
        )
        .await;

        // The final broadcast arrives before the disconnect notice.
        let mut closed_event = false;
        loop {
            let packet = recv_matching(&right, |p| {
                matches!(
                    p,
                    Packet::Broadcast(ServerBroadcast::Event(GameEvent::SessionClosed))
                        | Packet::Disconnected { .. }
                )
            })
            .await;
            match packet {
                Packet::Disconnected { reason } => {
                    assert_eq!(reason, "Session closed");
                    assert!(closed_event, "Disconnected arrived before SessionClosed");
                    break;
                }
                _ => closed_event = true,
            }
        }

        let result = timeout(Duration::from_secs(3), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn malformed_datagrams_are_dropped() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let client = socket().await;

        client.send_to(&[0xff, 0x00, 0x13], server).await.unwrap();
        client.send_to(&[], server).await.unwrap();

        assert_eq!(connect(&client, server).await, (1, Side::Left));
    }

    #[tokio::test]
    async fn wrong_protocol_version_is_refused() {
        let (server, _handle) = start_server(MatchConfig::default()).await;
        let client = socket().await;
        send(
            &client,
            server,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION + 1,
            },
        )
        .await;
        assert_eq!(
            recv_matching(&client, |_| true).await,
            Packet::Disconnected {
                reason: "Protocol version mismatch".to_string()
            }
        );
    }
}

/// CONFIGURATION TESTS
mod config_tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = MatchConfig::from_toml_str("score_to_win = 3\nbase_speed = 10.0\n").unwrap();
        assert_eq!(config.score_to_win, 3);
        assert_eq!(config.base_speed, 10.0);
        assert_eq!(config.hits_to_medium, 4);
        assert_eq!(config.hits_to_fast, 12);
    }

    #[test]
    fn invalid_toml_config_is_rejected() {
        assert!(MatchConfig::from_toml_str("hits_to_medium = 0").is_err());
        assert!(MatchConfig::from_toml_str("score_to_win = \"eleven\"").is_err());
    }

    #[tokio::test]
    async fn server_refuses_invalid_config() {
        let config = MatchConfig {
            base_speed: -1.0,
            ..MatchConfig::default()
        };
        assert!(Server::new("127.0.0.1:0", Duration::from_millis(10), config)
            .await
            .is_err());
    }
}
