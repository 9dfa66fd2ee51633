//! Wire protocol between session clients and the room store.

use crate::error::StoreError;
use crate::patch::ConditionalPatch;
use crate::record::RoomRecord;
use serde::{Deserialize, Serialize};

/// Datagram payload, bincode-encoded. The first group travels
/// client-to-store, the second store-to-client.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    /// Create-if-absent; the creator is subscribed on success.
    Create {
        client_version: u32,
        record: RoomRecord,
    },
    /// One-shot read of the current record.
    Read { code: String },
    /// Conditional merge-write against the named room.
    Write {
        code: String,
        patch: ConditionalPatch,
    },
    /// Subscribe to every change of the named room; answered with the
    /// current snapshot immediately, which is also how a returning
    /// client resyncs.
    Subscribe {
        client_version: u32,
        code: String,
    },
    Unsubscribe { code: String },
    /// Keep-alive; subscribers that stop pinging are dropped.
    Ping { timestamp: u64 },

    /// Full copy of the record, pushed to every subscriber on each
    /// applied change. Delivery is at-least-once; observers must treat
    /// redelivery as a no-op.
    Snapshot { record: RoomRecord },
    /// A create/read/write the store refused, echoed to the sender only.
    Rejected { code: String, error: StoreError },
    Pong { timestamp: u64 },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
