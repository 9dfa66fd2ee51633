//! Subscription registry for the room store.
//!
//! Tracks which socket addresses observe which rooms, and when each was
//! last heard from. The store is push-based: every applied write fans a
//! fresh snapshot out to the room's subscriber list. Subscribers that
//! stop sending packets (heartbeats included) are swept out so snapshots
//! stop flowing to clients that left without unsubscribing.

use log::info;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected observer and the rooms it watches.
#[derive(Debug)]
pub struct Subscriber {
    pub addr: SocketAddr,
    /// Last time any packet arrived from this address.
    pub last_seen: Instant,
    /// Room codes this address is subscribed to.
    pub rooms: HashSet<String>,
}

impl Subscriber {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
            rooms: HashSet::new(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All subscriptions, indexed both ways: by address for heartbeat
/// bookkeeping and by room code for snapshot fan-out.
pub struct SubscriberManager {
    subscribers: HashMap<SocketAddr, Subscriber>,
    by_room: HashMap<String, HashSet<SocketAddr>>,
    timeout: Duration,
}

impl SubscriberManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            subscribers: HashMap::new(),
            by_room: HashMap::new(),
            timeout,
        }
    }

    /// Registers `addr` as an observer of `code`. Re-subscribing is a
    /// no-op beyond refreshing the heartbeat.
    pub fn subscribe(&mut self, addr: SocketAddr, code: &str) {
        let subscriber = self
            .subscribers
            .entry(addr)
            .or_insert_with(|| Subscriber::new(addr));
        subscriber.last_seen = Instant::now();

        if subscriber.rooms.insert(code.to_string()) {
            info!("{} subscribed to room {}", addr, code);
        }
        self.by_room.entry(code.to_string()).or_default().insert(addr);
    }

    /// Releases one subscription. No further snapshots for `code` reach
    /// `addr` once this returns.
    pub fn unsubscribe(&mut self, addr: SocketAddr, code: &str) {
        if let Some(subscriber) = self.subscribers.get_mut(&addr) {
            if subscriber.rooms.remove(code) {
                info!("{} unsubscribed from room {}", addr, code);
            }
            if subscriber.rooms.is_empty() {
                self.subscribers.remove(&addr);
            }
        }
        if let Some(addrs) = self.by_room.get_mut(code) {
            addrs.remove(&addr);
            if addrs.is_empty() {
                self.by_room.remove(code);
            }
        }
    }

    /// Drops every subscription held by `addr`.
    pub fn drop_addr(&mut self, addr: SocketAddr) {
        if let Some(subscriber) = self.subscribers.remove(&addr) {
            for code in subscriber.rooms {
                if let Some(addrs) = self.by_room.get_mut(&code) {
                    addrs.remove(&addr);
                    if addrs.is_empty() {
                        self.by_room.remove(&code);
                    }
                }
            }
        }
    }

    /// Drops every subscriber of `code`; used when a room expires.
    pub fn drop_room(&mut self, code: &str) {
        if let Some(addrs) = self.by_room.remove(code) {
            for addr in addrs {
                if let Some(subscriber) = self.subscribers.get_mut(&addr) {
                    subscriber.rooms.remove(code);
                    if subscriber.rooms.is_empty() {
                        self.subscribers.remove(&addr);
                    }
                }
            }
        }
    }

    /// Refreshes the heartbeat for a known address.
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(subscriber) = self.subscribers.get_mut(&addr) {
            subscriber.last_seen = Instant::now();
        }
    }

    /// Fan-out list for one room.
    pub fn addrs_for(&self, code: &str) -> Vec<SocketAddr> {
        self.by_room
            .get(code)
            .map(|addrs| addrs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Removes subscribers whose heartbeats stopped and returns their
    /// addresses.
    pub fn check_timeouts(&mut self) -> Vec<SocketAddr> {
        let timeout = self.timeout;
        let timed_out: Vec<SocketAddr> = self
            .subscribers
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.addr)
            .collect();

        for addr in &timed_out {
            info!("Subscriber {} timed out", addr);
            self.drop_addr(*addr);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
