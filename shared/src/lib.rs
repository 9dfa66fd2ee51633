//! Types and rules shared by the room store and its clients: the room
//! record, conditional merge-write patches, the round state machine and
//! the wire protocol.

pub mod actions;
pub mod codes;
pub mod error;
pub mod patch;
pub mod protocol;
pub mod record;
pub mod roles;

pub use error::{ActionError, StoreError};
pub use patch::{ConditionalPatch, PatchOp};
pub use protocol::Packet;
pub use record::{GuessRecord, Phase, PlayerEntry, RevealEntry, Role, RoleEntry, RoomRecord};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 1;

/// A room always plays with exactly this many players.
pub const ROOM_SIZE: usize = 4;

/// How long the Sipahi has to pick a target once the guess phase begins.
pub const GUESS_TIMEOUT_MS: u64 = 90_000;

/// Current timestamp in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
