//! The room record: the single shared document every client observes.

use serde::{Deserialize, Serialize};

/// The four fixed identities handed out each round.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Raja,
    Mantri,
    Chor,
    Sipahi,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Raja, Role::Mantri, Role::Chor, Role::Sipahi];

    /// Whether this role discloses itself during the reveal phase.
    pub fn reveals(self) -> bool {
        matches!(self, Role::Raja | Role::Sipahi)
    }

    /// Whether the Sipahi may name this role's holder as the Chor.
    pub fn guessable(self) -> bool {
        matches!(self, Role::Mantri | Role::Chor)
    }
}

/// Stage of the round state machine.
///
/// `Lobby -> Reveal -> Guess -> RoundResult -> Lobby` cycles; `Completed`
/// is a terminal sink the store stops writing to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Lobby,
    Reveal,
    Guess,
    RoundResult,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoleEntry {
    pub id: String,
    pub role: Role,
}

/// One reveal submission. Membership in `RoomRecord::revealed` is by
/// structural equality, so resubmitting the same pair is a no-op.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RevealEntry {
    pub id: String,
    pub role: Role,
}

/// Outcome of the guess phase. `guessed` is `None` when the deadline
/// expired without an explicit pick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GuessRecord {
    pub sipahi: String,
    pub guessed: Option<String>,
    pub correct: bool,
}

/// One record per room code. Field names serialize in camelCase to match
/// the document schema the record is stored under.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub code: String,
    pub host: String,
    /// Join order; index 0 is the host and role assignment is positional.
    pub players: Vec<PlayerEntry>,
    pub phase: Phase,
    /// Bijection onto the four roles whenever `phase != Lobby`.
    pub player_roles: Vec<RoleEntry>,
    pub revealed: Vec<RevealEntry>,
    pub guess: Option<GuessRecord>,
    /// Authoritative guess deadline (ms epoch); set iff `phase == Guess`.
    pub guess_deadline: Option<u64>,
    pub created: u64,
}

impl RoomRecord {
    pub fn new(code: &str, host_name: &str, host_id: &str, created: u64) -> Self {
        Self {
            code: code.to_string(),
            host: host_name.to_string(),
            players: vec![PlayerEntry {
                id: host_id.to_string(),
                name: host_name.to_string(),
            }],
            phase: Phase::Lobby,
            player_roles: Vec::new(),
            revealed: Vec::new(),
            guess: None,
            guess_deadline: None,
            created,
        }
    }

    pub fn player(&self, id: &str) -> Option<&PlayerEntry> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.player(id).map(|p| p.name.as_str())
    }

    /// The host is always `players[0]`.
    pub fn host_id(&self) -> Option<&str> {
        self.players.first().map(|p| p.id.as_str())
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host_id() == Some(id)
    }

    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.player_roles.iter().find(|r| r.id == id).map(|r| r.role)
    }

    pub fn holder_of(&self, role: Role) -> Option<&str> {
        self.player_roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.id.as_str())
    }

    pub fn has_revealed(&self, id: &str) -> bool {
        self.revealed.iter().any(|r| r.id == id)
    }

    /// True once both the Raja and the Sipahi entries are present.
    pub fn reveal_complete(&self) -> bool {
        self.revealed.iter().any(|r| r.role == Role::Raja)
            && self.revealed.iter().any(|r| r.role == Role::Sipahi)
    }

    /// Players the Sipahi may accuse: holders of Mantri or Chor only.
    /// The Raja and the Sipahi themselves are never offered.
    pub fn guess_targets(&self) -> Vec<&PlayerEntry> {
        self.players
            .iter()
            .filter(|p| self.role_of(&p.id).map(Role::guessable).unwrap_or(false))
            .collect()
    }

    /// Structural invariants from the record contract. Exercised by tests
    /// after every transition.
    pub fn invariants_hold(&self) -> bool {
        let roles_populated = !self.player_roles.is_empty();
        let in_round = matches!(self.phase, Phase::Reveal | Phase::Guess | Phase::RoundResult);
        if roles_populated != in_round && self.phase != Phase::Completed {
            return false;
        }
        if roles_populated {
            let mut seen = Vec::new();
            for entry in &self.player_roles {
                if !self.is_member(&entry.id) || seen.contains(&entry.role) {
                    return false;
                }
                seen.push(entry.role);
            }
            if self.player_roles.len() != Role::ALL.len() {
                return false;
            }
        }
        if self
            .revealed
            .iter()
            .any(|r| self.role_of(&r.id).map(|role| !role.reveals()).unwrap_or(true))
        {
            return false;
        }
        if self.guess.is_some() != (self.phase == Phase::RoundResult) {
            return false;
        }
        if self.guess_deadline.is_some() != (self.phase == Phase::Guess) {
            return false;
        }
        true
    }
}
