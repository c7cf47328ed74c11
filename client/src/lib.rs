//! # Pong Match Client
//!
//! Headless client for the match server. It mirrors the replicated match
//! state, drives its own paddle from an [`input::AxisSource`] and sends every
//! change as a sequenced request. The server stays authoritative: the local
//! paddle position is replaced whenever the server replicates a new one.
//!
//! ## Module Organization
//!
//! - [`game`]: the [`game::ClientView`] mirror of fields, snapshots and events
//! - [`input`]: axis sources (ball tracking, scripted) and request sequencing
//! - [`network`]: UDP connection, packet handling and the client loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::TrackingAxis;
//! use client::network::{Client, SessionOptions};
//! use shared::MatchConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(
//!         "127.0.0.1:8080",
//!         &MatchConfig::default(),
//!         Box::new(TrackingAxis::new(2.0)),
//!         SessionOptions::default(),
//!     )
//!     .await?;
//!
//!     // Plays until the session is closed.
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
