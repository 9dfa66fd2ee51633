//! Store network layer: UDP transport around the room map.

use crate::rooms::RoomStore;
use crate::subscribers::SubscriberManager;
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// How long a subscriber may stay silent before it is dropped.
const SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(15);

/// Messages sent from network tasks to the main store loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SubscriberTimeout {
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the outbound network task
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        packet: Packet,
        addr: SocketAddr,
    },
    /// One snapshot, many observers. Sends are drained in order by a
    /// single task, so each subscriber sees writes to a room in a
    /// consistent order.
    Fanout {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Main server coordinating the sockets and the room map
pub struct Server {
    socket: Arc<UdpSocket>,
    subscribers: Arc<RwLock<SubscriberManager>>,
    rooms: RoomStore,
    sweep_interval: Duration,
    max_room_idle: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        sweep_interval: Duration,
        max_room_idle: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Store listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            subscribers: Arc::new(RwLock::new(SubscriberManager::new(SUBSCRIBER_TIMEOUT))),
            rooms: RoomStore::new(),
            sweep_interval,
            max_room_idle,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    /// Bound address; handy when the port was chosen by the OS.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 8192];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = Packet::decode(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to decode packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outbound packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Fanout { packet, addrs } => {
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send snapshot to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that sweeps out silent subscribers
    fn spawn_timeout_checker(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut subscribers_guard = subscribers.write().await;
                    subscribers_guard.check_timeouts()
                };

                for addr in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::SubscriberTimeout { addr }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(OutboundMessage::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn fanout(&self, packet: Packet, addrs: Vec<SocketAddr>) {
        if let Err(e) = self.out_tx.send(OutboundMessage::Fanout { packet, addrs }) {
            error!("Failed to queue snapshot fanout: {}", e);
        }
    }

    /// Processes one client packet against the room map
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Create {
                client_version,
                record,
            } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} speaks protocol {} (store speaks {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                }

                let code = record.code.clone();
                match self.rooms.create(record) {
                    Ok(created) => {
                        let snapshot = Packet::Snapshot {
                            record: created.clone(),
                        };
                        let mut subscribers = self.subscribers.write().await;
                        subscribers.subscribe(addr, &code);
                        self.send_packet(snapshot, addr);
                    }
                    Err(error) => {
                        debug!("Create {} from {} rejected: {}", code, addr, error);
                        self.send_packet(Packet::Rejected { code, error }, addr);
                    }
                }
            }

            Packet::Read { code } => match self.rooms.read(&code) {
                Ok(record) => {
                    self.send_packet(
                        Packet::Snapshot {
                            record: record.clone(),
                        },
                        addr,
                    );
                }
                Err(error) => {
                    self.send_packet(Packet::Rejected { code, error }, addr);
                }
            },

            Packet::Subscribe {
                client_version,
                code,
            } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} speaks protocol {} (store speaks {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                }

                match self.rooms.read(&code) {
                    Ok(record) => {
                        let snapshot = Packet::Snapshot {
                            record: record.clone(),
                        };
                        let mut subscribers = self.subscribers.write().await;
                        subscribers.subscribe(addr, &code);
                        // The immediate snapshot is the resync contract.
                        self.send_packet(snapshot, addr);
                    }
                    Err(error) => {
                        self.send_packet(Packet::Rejected { code, error }, addr);
                    }
                }
            }

            Packet::Unsubscribe { code } => {
                let mut subscribers = self.subscribers.write().await;
                subscribers.unsubscribe(addr, &code);
            }

            Packet::Write { code, patch } => {
                {
                    let mut subscribers = self.subscribers.write().await;
                    subscribers.touch(addr);
                }

                match self.rooms.apply(&code, &patch) {
                    Ok(record) => {
                        let snapshot = Packet::Snapshot {
                            record: record.clone(),
                        };
                        let mut addrs = {
                            let subscribers = self.subscribers.read().await;
                            subscribers.addrs_for(&code)
                        };
                        // An unsubscribed writer still gets the applied
                        // record back.
                        if !addrs.contains(&addr) {
                            addrs.push(addr);
                        }
                        self.fanout(snapshot, addrs);
                    }
                    Err(error) => {
                        debug!("Write to {} from {} rejected: {}", code, addr, error);
                        self.send_packet(Packet::Rejected { code, error }, addr);
                    }
                }
            }

            Packet::Ping { timestamp } => {
                let mut subscribers = self.subscribers.write().await;
                subscribers.touch(addr);
                self.send_packet(Packet::Pong { timestamp }, addr);
            }

            Packet::Snapshot { .. } | Packet::Rejected { .. } | Packet::Pong { .. } => {
                warn!("Unexpected store-to-client packet from {}", addr);
            }
        }
    }

    /// Expires idle rooms and releases their subscribers
    async fn sweep_idle_rooms(&mut self) {
        let expired = self.rooms.purge_idle(self.max_room_idle);
        if expired.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.write().await;
        for code in expired {
            subscribers.drop_room(&code);
        }
    }

    /// Main loop: serializes every create and merge-write through one task
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut sweep = interval(self.sweep_interval);
        // The first tick fires immediately; skip it.
        sweep.tick().await;

        info!("Store started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SubscriberTimeout { addr }) => {
                            debug!("Dropped silent subscriber {}", addr);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Store shutting down");
                            break;
                        }
                    }
                },

                _ = sweep.tick() => {
                    self.sweep_idle_rooms().await;

                    if !self.rooms.is_empty() {
                        let watcher_count = {
                            let subscribers = self.subscribers.read().await;
                            subscribers.len()
                        };
                        debug!("{} rooms live, {} subscribers", self.rooms.len(), watcher_count);
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RoomRecord;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn server_message_carries_packet_and_addr() {
        let packet = Packet::Ping { timestamp: 7 };
        let msg = ServerMessage::PacketReceived {
            packet,
            addr: test_addr(),
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr } => {
                assert_eq!(addr, test_addr());
                assert!(matches!(p, Packet::Ping { timestamp: 7 }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn outbound_fanout_lists_every_observer() {
        let record = RoomRecord::new("ABCD12", "Alice", "a", 0);
        let addrs: Vec<SocketAddr> = vec![
            "127.0.0.1:9001".parse().unwrap(),
            "127.0.0.1:9002".parse().unwrap(),
        ];

        let msg = OutboundMessage::Fanout {
            packet: Packet::Snapshot { record },
            addrs: addrs.clone(),
        };

        match msg {
            OutboundMessage::Fanout { addrs: a, .. } => assert_eq!(a, addrs),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        tx.send(ServerMessage::SubscriberTimeout { addr: test_addr() })
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::SubscriberTimeout { addr } => assert_eq!(addr, test_addr()),
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn server_binds_an_os_assigned_port() {
        let server = Server::new(
            "127.0.0.1:0",
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
