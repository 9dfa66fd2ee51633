//! Conditional merge-writes against a room record.
//!
//! A patch is an optional equality guard on `phase` plus an ordered list
//! of ops. Application is all-or-nothing: the guard and every op are
//! checked before anything mutates, so a rejected patch leaves the record
//! untouched. Two clients racing to perform the same transition therefore
//! produce one effective change; the loser is rejected with
//! `InvalidTransition`.

use crate::error::StoreError;
use crate::record::{GuessRecord, Phase, PlayerEntry, RevealEntry, RoleEntry, RoomRecord};
use crate::ROOM_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PatchOp {
    SetPhase(Phase),
    /// Union-append by player id; a no-op when the id is already present,
    /// a rejection when a fifth distinct player would be added.
    AddPlayer(PlayerEntry),
    SetRoles(Vec<RoleEntry>),
    ClearRoles,
    /// Union-append by structural equality; duplicates are no-ops.
    AddReveal(RevealEntry),
    ClearRevealed,
    SetGuess(GuessRecord),
    ClearGuess,
    SetGuessDeadline(u64),
    ClearGuessDeadline,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConditionalPatch {
    /// Compare-and-swap guard: apply only while the record is still in
    /// this phase.
    pub expected_phase: Option<Phase>,
    pub ops: Vec<PatchOp>,
}

impl ConditionalPatch {
    /// Patch guarded on the record still being in `phase` at write time.
    pub fn when(phase: Phase) -> Self {
        Self {
            expected_phase: Some(phase),
            ops: Vec::new(),
        }
    }

    pub fn unconditional() -> Self {
        Self {
            expected_phase: None,
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Applies the patch atomically, or rejects it leaving `record`
    /// unchanged. A completed room rejects every write.
    pub fn apply(&self, record: &mut RoomRecord) -> Result<(), StoreError> {
        if record.phase == Phase::Completed {
            return Err(StoreError::RoomClosed(record.code.clone()));
        }
        if let Some(expected) = self.expected_phase {
            if record.phase != expected {
                return Err(StoreError::InvalidTransition {
                    expected,
                    found: record.phase,
                });
            }
        }

        // Validate every op before mutating anything.
        for op in &self.ops {
            if let PatchOp::AddPlayer(player) = op {
                let joined = record.is_member(&player.id);
                if !joined && record.players.len() >= ROOM_SIZE {
                    return Err(StoreError::RoomFull);
                }
            }
        }

        for op in &self.ops {
            Self::apply_op(record, op);
        }
        Ok(())
    }

    fn apply_op(record: &mut RoomRecord, op: &PatchOp) {
        match op {
            PatchOp::SetPhase(phase) => record.phase = *phase,
            PatchOp::AddPlayer(player) => {
                if !record.is_member(&player.id) {
                    record.players.push(player.clone());
                }
            }
            PatchOp::SetRoles(roles) => record.player_roles = roles.clone(),
            PatchOp::ClearRoles => record.player_roles.clear(),
            PatchOp::AddReveal(entry) => {
                if !record.revealed.contains(entry) {
                    record.revealed.push(entry.clone());
                }
            }
            PatchOp::ClearRevealed => record.revealed.clear(),
            PatchOp::SetGuess(guess) => record.guess = Some(guess.clone()),
            PatchOp::ClearGuess => record.guess = None,
            PatchOp::SetGuessDeadline(deadline) => record.guess_deadline = Some(*deadline),
            PatchOp::ClearGuessDeadline => record.guess_deadline = None,
        }
    }
}
