//! # Session Client Library
//!
//! Per-client session controller for the four-player deduction game.
//! Each client process owns exactly one subscription to one room record
//! and coordinates with every other client purely through conditional
//! merge-writes against that record; there is no client-to-client
//! channel and no lock anywhere.
//!
//! ## How a client participates
//!
//! The controller consumes snapshots pushed by the store and derives,
//! per phase, what this player may see and do. User actions become
//! guarded patches; a rejected patch is never an error condition worth
//! surfacing beyond a debug line, because a rejection only ever means
//! another client got there first and the next snapshot will show the
//! result.
//!
//! Two writes are not user-initiated: the reveal coordinator's phase
//! advance (attempted by any observer once both reveals are in) and the
//! guess timeout (attempted by any observer once the record's own
//! deadline passes). Both ride the same guard discipline, so however
//! many clients fire them, exactly one lands.
//!
//! ## Module Organization
//!
//! - [`identity`]: the external-identity seam; writes are impossible
//!   without an issued id
//! - [`session`]: snapshot-to-view derivation and action-to-patch
//!   translation
//! - [`commands`]: prompt-line parsing
//! - [`network`]: the UDP driver looping over socket, stdin and a
//!   heartbeat tick

pub mod commands;
pub mod identity;
pub mod network;
pub mod session;
