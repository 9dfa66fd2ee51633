//! The room map: create-if-absent, read, conditional apply, idle expiry.

use log::info;
use shared::{ConditionalPatch, RoomRecord, StoreError};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct RoomEntry {
    record: RoomRecord,
    last_activity: Instant,
}

/// All live room records. Owned by the server's main loop, so every
/// operation here runs serialized; create-if-absent and guarded patch
/// application are atomic without any locking.
pub struct RoomStore {
    rooms: HashMap<String, RoomEntry>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Atomic create-if-absent. The record arrives fully formed from the
    /// creating client; an occupied code is a clean rejection, not a
    /// race window.
    pub fn create(&mut self, record: RoomRecord) -> Result<&RoomRecord, StoreError> {
        let code = record.code.clone();
        match self.rooms.entry(code.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(StoreError::AlreadyExists(code))
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                info!("Created room {} (host {})", code, record.host);
                let entry = slot.insert(RoomEntry {
                    record,
                    last_activity: Instant::now(),
                });
                Ok(&entry.record)
            }
        }
    }

    pub fn read(&self, code: &str) -> Result<&RoomRecord, StoreError> {
        self.rooms
            .get(code)
            .map(|entry| &entry.record)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    /// Applies a conditional patch and returns the new record, or the
    /// rejection that left it untouched.
    pub fn apply(
        &mut self,
        code: &str,
        patch: &ConditionalPatch,
    ) -> Result<&RoomRecord, StoreError> {
        let entry = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))?;

        patch.apply(&mut entry.record)?;
        entry.last_activity = Instant::now();
        Ok(&entry.record)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Expires rooms idle past `max_idle`, returning their codes so the
    /// server can drop their subscribers too.
    pub fn purge_idle(&mut self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_activity) >= max_idle)
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            self.rooms.remove(code);
            info!("Expired idle room {}", code);
        }
        expired
    }
}
