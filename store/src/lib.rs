//! # Room Document Store
//!
//! Authoritative store for room records. Clients never talk to each
//! other; they read, conditionally merge-write, and subscribe to one
//! shared record per room, and this service fans every applied change
//! back out to all subscribers of that room.
//!
//! ## Architecture
//!
//! A single-threaded, event-driven loop owns the room map, so every
//! create and merge-write is serialized: create-if-absent is atomic and
//! a conditional patch's guard check and application happen with no
//! interleaved write. Async tasks around the loop handle the sockets:
//!
//! - **Network Receiver**: decodes incoming datagrams and forwards them
//!   to the main loop
//! - **Network Sender**: drains the outbound queue, serializing sends so
//!   each subscriber observes snapshots in a consistent order
//! - **Timeout Checker**: drops subscribers whose heartbeats stopped
//!
//! ## Module Organization
//!
//! - [`rooms`]: the record map with create/read/apply and idle-room
//!   expiry
//! - [`subscribers`]: per-room subscriber registry keyed by socket
//!   address, with heartbeat tracking
//! - [`network`]: the UDP server wiring the two together
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use store::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_secs(60),   // idle-room sweep interval
//!         Duration::from_secs(3600), // idle horizon before a room expires
//!     )
//!     .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The store knows nothing about the game: phase semantics live in the
//! patches clients construct. Its whole contract is "apply this patch if
//! the guard still holds, tell everyone watching".

pub mod network;
pub mod rooms;
pub mod subscribers;
