//! Scripted smoke client: four players run one full round against a
//! live store, exercising create, join, reveal, the coordinated phase
//! advance, the guess, and the round reset.
//!
//! Usage: `test_client [store_addr]` (default 127.0.0.1:8080) with a
//! store already running there.

use shared::{actions, codes, now_ms, Packet, Phase, Role, RoomRecord, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

struct ScriptedPlayer {
    socket: UdpSocket,
    id: String,
    name: String,
}

impl ScriptedPlayer {
    async fn new(
        server: &str,
        id: &str,
        name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server).await?;
        Ok(Self {
            socket,
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    async fn send(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send(&packet.encode()?).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 8192];
        let len = timeout(RECV_TIMEOUT, self.socket.recv(&mut buffer)).await??;
        Ok(Packet::decode(&buffer[0..len])?)
    }

    /// Waits for a snapshot satisfying `pred`, skipping everything else.
    async fn snapshot_where(
        &self,
        pred: impl Fn(&RoomRecord) -> bool,
    ) -> Result<RoomRecord, Box<dyn std::error::Error>> {
        loop {
            match self.recv().await? {
                Packet::Snapshot { record } if pred(&record) => return Ok(record),
                Packet::Snapshot { .. } => continue,
                Packet::Rejected { error, .. } => {
                    // Expected when this player loses a transition race.
                    println!("  {} write rejected: {}", self.name, error);
                }
                _ => continue,
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let code = codes::generate_code(&mut rand::thread_rng());
    println!("Playing one scripted round in room {} via {}", code, server);

    let alice = ScriptedPlayer::new(&server, "p1", "Alice").await?;
    let bob = ScriptedPlayer::new(&server, "p2", "Bob").await?;
    let cara = ScriptedPlayer::new(&server, "p3", "Cara").await?;
    let dev = ScriptedPlayer::new(&server, "p4", "Dev").await?;

    // Alice creates the room and is auto-subscribed.
    let record = actions::initial_record(&code, &alice.name, &alice.id, now_ms())?;
    alice
        .send(&Packet::Create {
            client_version: PROTOCOL_VERSION,
            record,
        })
        .await?;
    alice.snapshot_where(|r| r.is_member("p1")).await?;
    println!("  room created");

    // The others subscribe, then merge-write themselves in.
    for player in [&bob, &cara, &dev] {
        player
            .send(&Packet::Subscribe {
                client_version: PROTOCOL_VERSION,
                code: code.clone(),
            })
            .await?;
        let snapshot = player.snapshot_where(|_| true).await?;
        if let Some(patch) = actions::join_room(&snapshot, &player.id, &player.name)? {
            player
                .send(&Packet::Write {
                    code: code.clone(),
                    patch,
                })
                .await?;
        }
        player.snapshot_where(|r| r.is_member(&player.id)).await?;
        println!("  {} joined", player.name);
    }

    // Host starts the round once all four are in.
    let lobby = alice.snapshot_where(|r| r.players.len() == 4).await?;
    let patch = actions::start_round(&lobby, &alice.id, &mut rand::thread_rng())?;
    alice
        .send(&Packet::Write {
            code: code.clone(),
            patch,
        })
        .await?;

    let revealing = alice.snapshot_where(|r| r.phase == Phase::Reveal).await?;
    let raja_id = revealing.holder_of(Role::Raja).unwrap().to_string();
    let sipahi_id = revealing.holder_of(Role::Sipahi).unwrap().to_string();
    let chor_id = revealing.holder_of(Role::Chor).unwrap().to_string();
    println!(
        "  roles assigned: raja={}, sipahi={}",
        revealing.name_of(&raja_id).unwrap(),
        revealing.name_of(&sipahi_id).unwrap()
    );

    let players = [&alice, &bob, &cara, &dev];
    let by_id = |id: &str| *players.iter().find(|p| p.id == id).unwrap();
    let raja = by_id(&raja_id);
    let sipahi = by_id(&sipahi_id);

    // Both privileged players reveal; both then race the phase advance.
    // The store collapses the two guarded writes into one transition.
    for player in [raja, sipahi] {
        let snapshot = player.snapshot_where(|r| r.phase == Phase::Reveal).await?;
        let patch = actions::submit_reveal(&snapshot, &player.id)?;
        player
            .send(&Packet::Write {
                code: code.clone(),
                patch,
            })
            .await?;
    }
    for player in [raja, sipahi] {
        let snapshot = player.snapshot_where(|r| r.reveal_complete()).await?;
        if let Some(patch) = actions::advance_to_guess(&snapshot, now_ms()) {
            player
                .send(&Packet::Write {
                    code: code.clone(),
                    patch,
                })
                .await?;
        }
    }

    // The sipahi accuses the actual chor.
    let guessing = sipahi.snapshot_where(|r| r.phase == Phase::Guess).await?;
    println!(
        "  guess phase, targets: {:?}",
        guessing
            .guess_targets()
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
    );
    let patch = actions::submit_guess(&guessing, &sipahi.id, &chor_id)?;
    sipahi
        .send(&Packet::Write {
            code: code.clone(),
            patch,
        })
        .await?;

    let result = sipahi
        .snapshot_where(|r| r.phase == Phase::RoundResult)
        .await?;
    let guess = result.guess.as_ref().unwrap();
    println!(
        "  {} guessed {:?}: correct={}",
        guess.sipahi, guess.guessed, guess.correct
    );
    assert!(guess.correct, "scripted guess names the chor");

    // Anyone may reset; Dev does.
    let snapshot = dev.snapshot_where(|r| r.phase == Phase::RoundResult).await?;
    let patch = actions::next_round(&snapshot, &dev.id)?;
    dev.send(&Packet::Write {
        code: code.clone(),
        patch,
    })
    .await?;

    let reset = dev.snapshot_where(|r| r.phase == Phase::Lobby).await?;
    assert!(reset.player_roles.is_empty());
    assert_eq!(reset.players.len(), 4);
    println!("  round reset, room ready for another");

    for player in players {
        player
            .send(&Packet::Unsubscribe { code: code.clone() })
            .await?;
    }

    println!("Smoke round complete");
    Ok(())
}
