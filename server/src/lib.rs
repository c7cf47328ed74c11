//! # Pong Match Server
//!
//! Authoritative server for a two-player Pong match. The server owns every
//! piece of match state; clients only submit requests and receive the
//! replicated results.
//!
//! ## Module Organization
//!
//! - [`replication`]: replicated fields, the replication group and the single
//!   entry point for client requests
//! - [`events`]: explicit publish/subscribe bus for presentation events
//! - [`ball`]: ball state, speed tiers and bounce rules
//! - [`paddle`]: paddle ownership and clamped position arbitration
//! - [`physics`]: per-tick integration and contact detection
//! - [`match_controller`]: scoring, match end, restart votes and quorum
//! - [`client_manager`]: address bookkeeping, sequence filtering, timeouts
//! - [`network`]: UDP transport and the fixed-rate main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::MatchConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         MatchConfig::default(),
//!     )
//!     .await?;
//!
//!     // Runs until a player quits the session.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod ball;
pub mod client_manager;
pub mod events;
pub mod match_controller;
pub mod network;
pub mod paddle;
pub mod physics;
pub mod replication;
