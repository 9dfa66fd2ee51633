//! The session controller: one per client, per room.
//!
//! Owns this client's identity and the latest observed snapshot, and
//! turns both into (a) the phase-appropriate view and (b) conditional
//! patches for user actions. Everything here is synchronous and
//! deterministic given a snapshot and a clock value, so the whole
//! controller is testable without a network.
//!
//! Observation is idempotent: the store may redeliver snapshots, and a
//! redelivered snapshot derives the same view and at worst re-emits a
//! guarded patch the store absorbs as a lost race.

use crate::identity::IdentityProvider;
use log::{debug, warn};
use rand::Rng;
use shared::{
    actions, ActionError, ConditionalPatch, GuessRecord, Phase, PlayerEntry, Role, RoomRecord,
    ROOM_SIZE,
};

/// What this client should show and allow, derived per snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerView {
    Lobby {
        code: String,
        players: Vec<PlayerEntry>,
        is_host: bool,
        /// Host-only affordance, enabled once four players are seated.
        can_start: bool,
    },
    Reveal {
        role: Option<Role>,
        /// True for an unrevealed Raja or Sipahi.
        can_reveal: bool,
        revealed_count: usize,
    },
    Guess {
        role: Option<Role>,
        is_sipahi: bool,
        /// Empty unless this client is the Sipahi; never includes the
        /// Raja or the Sipahi themselves.
        targets: Vec<PlayerEntry>,
        remaining_ms: u64,
    },
    RoundResult {
        role: Option<Role>,
        guess: Option<GuessRecord>,
    },
    Completed,
}

pub struct SessionController {
    identity: Option<String>,
    name: String,
    snapshot: Option<RoomRecord>,
    /// Set while this client still needs to merge itself into `players`.
    joining: bool,
}

impl SessionController {
    pub fn new(provider: &dyn IdentityProvider, name: &str) -> Self {
        Self {
            identity: provider.identity(),
            name: name.trim().to_string(),
            snapshot: None,
            joining: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Result<&str, ActionError> {
        self.identity
            .as_deref()
            .ok_or(ActionError::IdentityUnavailable)
    }

    pub fn snapshot(&self) -> Option<&RoomRecord> {
        self.snapshot.as_ref()
    }

    pub fn code(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|r| r.code.as_str())
    }

    /// Fresh lobby record for a create request, with this client seated
    /// as the host.
    pub fn initial_record(&self, code: &str, now_ms: u64) -> Result<RoomRecord, ActionError> {
        let id = self.identity()?.to_string();
        actions::initial_record(code, &self.name, &id, now_ms)
    }

    /// Arms the auto-join: the next snapshot that does not list this
    /// client produces a join patch.
    pub fn begin_join(&mut self) {
        self.joining = true;
    }

    /// Ingests one snapshot and returns the follow-up patches this
    /// client should attempt: the pending join, and the reveal
    /// coordinator's phase advance once both reveals are in. Either may
    /// lose its race at the store; the next snapshot settles it.
    pub fn observe(&mut self, record: RoomRecord, now_ms: u64) -> Vec<ConditionalPatch> {
        let record = &*self.snapshot.insert(record);

        let mut followups = Vec::new();
        let Some(id) = self.identity.as_deref() else {
            return followups;
        };

        if self.joining {
            if record.is_member(id) {
                self.joining = false;
            } else {
                match actions::join_room(record, id, &self.name) {
                    Ok(Some(patch)) => followups.push(patch),
                    Ok(None) => self.joining = false,
                    Err(err) => {
                        warn!("Cannot join room {}: {}", record.code, err);
                        self.joining = false;
                    }
                }
            }
        }

        if let Some(patch) = actions::advance_to_guess(record, now_ms) {
            debug!("Both reveals in; attempting phase advance");
            followups.push(patch);
        }

        followups
    }

    /// Timeout patch once the authoritative deadline has passed, `None`
    /// otherwise. Called from the driver's clock tick.
    pub fn poll_deadline(&self, now_ms: u64) -> Option<ConditionalPatch> {
        let id = self.identity.as_deref()?;
        let record = self.snapshot.as_ref()?;
        actions::resolve_timeout(record, id, now_ms).ok()
    }

    fn current(&self) -> Result<(&RoomRecord, &str), ActionError> {
        let id = self
            .identity
            .as_deref()
            .ok_or(ActionError::IdentityUnavailable)?;
        let record = self.snapshot.as_ref().ok_or(ActionError::NotAMember)?;
        Ok((record, id))
    }

    pub fn start_round(&self, rng: &mut impl Rng) -> Result<ConditionalPatch, ActionError> {
        let (record, id) = self.current()?;
        actions::start_round(record, id, rng)
    }

    pub fn reveal(&self) -> Result<ConditionalPatch, ActionError> {
        let (record, id) = self.current()?;
        actions::submit_reveal(record, id)
    }

    /// Accusation by display name, as typed at the prompt.
    pub fn guess_by_name(&self, target_name: &str) -> Result<ConditionalPatch, ActionError> {
        let (record, id) = self.current()?;
        let wanted = target_name.trim();
        let target = record
            .players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ActionError::UnknownTarget(wanted.to_string()))?;
        actions::submit_guess(record, id, &target.id)
    }

    pub fn next_round(&self) -> Result<ConditionalPatch, ActionError> {
        let (record, id) = self.current()?;
        actions::next_round(record, id)
    }

    pub fn close_room(&self) -> Result<ConditionalPatch, ActionError> {
        let (record, id) = self.current()?;
        actions::close_room(record, id)
    }

    /// Tears the session down. The caller releases the subscription; the
    /// cleared snapshot disarms `poll_deadline`, so no timer can write
    /// to a room this client no longer observes.
    pub fn leave(&mut self) {
        self.snapshot = None;
        self.joining = false;
    }

    /// Derives the view for the latest snapshot. Pure: the same snapshot
    /// and clock yield the same view.
    pub fn view(&self, now_ms: u64) -> Option<PlayerView> {
        let record = self.snapshot.as_ref()?;
        let id = self.identity.as_deref().unwrap_or("");

        Some(match record.phase {
            Phase::Lobby => {
                let is_host = record.is_host(id);
                PlayerView::Lobby {
                    code: record.code.clone(),
                    players: record.players.clone(),
                    is_host,
                    can_start: is_host && record.players.len() == ROOM_SIZE,
                }
            }
            Phase::Reveal => {
                let role = record.role_of(id);
                PlayerView::Reveal {
                    role,
                    can_reveal: role.map(Role::reveals).unwrap_or(false)
                        && !record.has_revealed(id),
                    revealed_count: record.revealed.len(),
                }
            }
            Phase::Guess => {
                let role = record.role_of(id);
                let is_sipahi = role == Some(Role::Sipahi);
                PlayerView::Guess {
                    role,
                    is_sipahi,
                    targets: if is_sipahi {
                        record.guess_targets().into_iter().cloned().collect()
                    } else {
                        Vec::new()
                    },
                    remaining_ms: record
                        .guess_deadline
                        .map(|deadline| deadline.saturating_sub(now_ms))
                        .unwrap_or(0),
                }
            }
            Phase::RoundResult => PlayerView::RoundResult {
                role: record.role_of(id),
                guess: record.guess.clone(),
            },
            Phase::Completed => PlayerView::Completed,
        })
    }

    /// `mm:ss`, as shown next to the guess prompt.
    pub fn format_remaining(remaining_ms: u64) -> String {
        let secs = remaining_ms / 1000;
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}
