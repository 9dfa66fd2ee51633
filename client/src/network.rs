//! Client network layer: drives a session controller over UDP.

use crate::commands::{self, Command};
use crate::identity::DeviceIdentity;
use crate::session::{PlayerView, SessionController};
use log::{debug, error, warn};
use shared::{codes, now_ms, ActionError, ConditionalPatch, Packet, StoreError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::net::UdpSocket;
use tokio::time::interval;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: SessionController,
    /// Room this client is bound to; `None` between rooms.
    code: Option<String>,
    subscribed: bool,
}

impl Client {
    pub async fn new(server_addr: &str, name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let session = SessionController::new(&DeviceIdentity::new(), name);
        session.identity()?;

        Ok(Client {
            socket,
            server_addr,
            session,
            code: None,
            subscribed: false,
        })
    }

    /// Creates a room, generating a code when none was supplied, and
    /// subscribes to it.
    pub async fn create_room(
        &mut self,
        code: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let code = match code {
            Some(input) => {
                let normalized = codes::normalize_code(input);
                if !codes::is_valid_code(&normalized) {
                    return Err(ActionError::BadRoomCode.into());
                }
                normalized
            }
            None => codes::generate_code(&mut rand::thread_rng()),
        };

        let record = self.session.initial_record(&code, now_ms())?;
        println!("Creating room {}...", code);
        self.code = Some(code);
        self.send_packet(&Packet::Create {
            client_version: PROTOCOL_VERSION,
            record,
        })
        .await?;
        Ok(())
    }

    /// Subscribes to an existing room; the first snapshot triggers the
    /// join merge-write.
    pub async fn join_room(&mut self, code: &str) -> Result<(), Box<dyn std::error::Error>> {
        let normalized = codes::normalize_code(code);
        if !codes::is_valid_code(&normalized) {
            return Err(ActionError::BadRoomCode.into());
        }

        println!("Joining room {}...", normalized);
        self.session.begin_join();
        self.code = Some(normalized.clone());
        self.send_packet(&Packet::Subscribe {
            client_version: PROTOCOL_VERSION,
            code: normalized,
        })
        .await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_write(&self, patch: ConditionalPatch) {
        let Some(code) = self.code.clone() else {
            debug!("Dropping write: not bound to a room");
            return;
        };
        if let Err(e) = self.send_packet(&Packet::Write { code, patch }).await {
            error!("Error sending write: {}", e);
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Snapshot { record } => {
                if self.code.as_deref() != Some(record.code.as_str()) {
                    debug!("Ignoring snapshot for stale room {}", record.code);
                    return;
                }
                self.subscribed = true;

                let followups = self.session.observe(record, now_ms());
                for patch in followups {
                    self.send_write(patch).await;
                }
                self.render();
            }

            Packet::Rejected { code, error } => match error {
                // A lost transition race: the next snapshot carries the
                // real state, nothing to do.
                StoreError::InvalidTransition { .. } => {
                    debug!("Write to {} lost a race: {}", code, error)
                }
                StoreError::NotFound(_) => {
                    println!("Room {} not found. Check the code and try again.", code);
                    self.reset_room();
                }
                StoreError::AlreadyExists(_) => {
                    println!("Room {} already exists. Pick a different code.", code);
                    self.reset_room();
                }
                StoreError::RoomClosed(_) => {
                    println!("Room {} has been closed.", code);
                }
                StoreError::RoomFull => {
                    println!("Room {} is already full.", code);
                    self.reset_room();
                }
            },

            Packet::Pong { .. } => {}

            other => warn!("Unexpected packet type: {:?}", other),
        }
    }

    fn reset_room(&mut self) {
        self.code = None;
        self.subscribed = false;
        self.session.leave();
    }

    fn render(&self) {
        let Some(view) = self.session.view(now_ms()) else {
            return;
        };

        match view {
            PlayerView::Lobby {
                code,
                players,
                is_host,
                can_start,
            } => {
                let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
                println!(
                    "[{}] Lobby, players ({}/4): {}",
                    code,
                    players.len(),
                    names.join(", ")
                );
                if can_start {
                    println!("All seats taken. Type 'start' to begin the round.");
                } else if is_host {
                    println!("Waiting for four players before the round can start.");
                }
            }
            PlayerView::Reveal {
                role,
                can_reveal,
                revealed_count,
            } => {
                if let Some(role) = role {
                    println!("Your role: {:?}", role);
                }
                if can_reveal {
                    println!("Type 'reveal' to disclose your role.");
                } else {
                    println!(
                        "Your role stays secret. Waiting for the Raja and Sipahi to reveal ({}/2).",
                        revealed_count
                    );
                }
            }
            PlayerView::Guess {
                is_sipahi,
                targets,
                remaining_ms,
                ..
            } => {
                if is_sipahi {
                    let names: Vec<&str> = targets.iter().map(|p| p.name.as_str()).collect();
                    println!(
                        "Guess the Chor! Suspects: {} (time left {})",
                        names.join(", "),
                        SessionController::format_remaining(remaining_ms)
                    );
                    println!("Type 'guess <player>'.");
                } else {
                    println!(
                        "The Sipahi is choosing ({} left)...",
                        SessionController::format_remaining(remaining_ms)
                    );
                }
            }
            PlayerView::RoundResult { guess, .. } => {
                match guess {
                    Some(guess) => match &guess.guessed {
                        Some(target) => println!(
                            "{} accused {}: {}!",
                            guess.sipahi,
                            target,
                            if guess.correct { "correct" } else { "wrong" }
                        ),
                        None => println!("Time ran out; no guess from {}.", guess.sipahi),
                    },
                    None => println!("Round over."),
                }
                println!("Type 'next' for another round.");
            }
            PlayerView::Completed => {
                println!("This room is closed.");
            }
        }
    }

    async fn dispatch(&mut self, command: Command) {
        let result = match command {
            Command::Start => self.session.start_round(&mut rand::thread_rng()),
            Command::Reveal => self.session.reveal(),
            Command::Guess { target } => self.session.guess_by_name(&target),
            Command::Next => self.session.next_round(),
            Command::Close => self.session.close_room(),
            Command::Help => {
                println!("{}", commands::HELP);
                return;
            }
            Command::Leave => {
                self.leave().await;
                return;
            }
            Command::Quit => return,
        };

        match result {
            Ok(patch) => self.send_write(patch).await,
            Err(err) => println!("{}", err),
        }
    }

    /// Releases the subscription and the session; cancels the local
    /// deadline poll with it.
    async fn leave(&mut self) {
        if let Some(code) = self.code.take() {
            if let Err(e) = self.send_packet(&Packet::Unsubscribe { code }).await {
                error!("Error unsubscribing: {}", e);
            }
            println!("Left the room.");
        }
        self.subscribed = false;
        self.session.leave();
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick = interval(Duration::from_secs(1));
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut buffer = [0u8; 8192];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) => {
                            if addr != self.server_addr {
                                continue;
                            }
                            match Packet::decode(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet).await,
                                Err(_) => warn!("Failed to decode packet from store"),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(text) => {
                            if text.trim().is_empty() {
                                continue;
                            }
                            match commands::parse(&text) {
                                Ok(Command::Quit) => break,
                                Ok(command) => self.dispatch(command).await,
                                Err(message) => println!("{}", message),
                            }
                        }
                        // stdin closed
                        None => break,
                    }
                },

                _ = tick.tick() => {
                    if self.subscribed {
                        if let Err(e) = self.send_packet(&Packet::Ping { timestamp: now_ms() }).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                        if let Some(patch) = self.session.poll_deadline(now_ms()) {
                            debug!("Guess deadline passed; submitting timeout resolution");
                            self.send_write(patch).await;
                        }
                    }
                },
            }
        }

        self.leave().await;
        Ok(())
    }
}
